//! Bus identities of the IRC clients the bridge knows how to speak for.
//!
//! Every flavor exposes the same two interfaces, only the names differ:
//!
//! | flavor  | service             | object               |
//! |---------|---------------------|----------------------|
//! | xchat   | org.xchat.service   | /org/xchat/Remote    |
//! | hexchat | org.hexchat.service | /org/hexchat/Remote  |
//! | weechat | tak.weebus          | /tak/weebus/WeeBus   |

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    #[default]
    Xchat,
    Hexchat,
    Weechat,
}

impl Flavor {
    pub fn identity(self) -> BusIdentity {
        let (service, object, connection_interface, plugin_interface) = match self {
            Flavor::Xchat => (
                "org.xchat.service",
                "/org/xchat/Remote",
                "org.xchat.connection",
                "org.xchat.plugin",
            ),
            Flavor::Hexchat => (
                "org.hexchat.service",
                "/org/hexchat/Remote",
                "org.hexchat.connection",
                "org.hexchat.plugin",
            ),
            Flavor::Weechat => (
                "tak.weebus",
                "/tak/weebus/WeeBus",
                "tak.weebus.connection",
                "tak.weebus.plugin",
            ),
        };
        BusIdentity {
            flavor: self,
            service: service.to_owned(),
            object: object.to_owned(),
            connection_interface: connection_interface.to_owned(),
            plugin_interface: plugin_interface.to_owned(),
        }
    }
}

/// Service name, root object path and interface names for one flavor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusIdentity {
    pub flavor: Flavor,
    pub service: String,
    pub object: String,
    pub connection_interface: String,
    pub plugin_interface: String,
}

impl BusIdentity {
    /// Object path of the connection with sequence number `seq`.
    pub fn connection_path(&self, seq: u64) -> String {
        format!("{}/{}", self.object.trim_end_matches('/'), seq)
    }
}

impl Default for BusIdentity {
    fn default() -> Self {
        Flavor::default().identity()
    }
}
