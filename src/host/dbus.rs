//! D-Bus export of the host adapter.
//!
//! The root object only carries the connection interface. Every `Connect`
//! exports a fresh object at `<root>/<seq>` carrying both interfaces, and the
//! adapter's signals are emitted from there.

use std::{marker::PhantomData, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use hook_protocol::{BridgeError, BridgeResult, BusIdentity, Flavor, HookSignal};
use tracing::{info, warn};
use zbus::{object_server::SignalEmitter, Connection, ObjectServer};

use crate::{
    config::BusKind,
    host::{
        adapter::{HostAdapter, SignalSink},
        native::NativeHost,
    },
};

fn failed(err: BridgeError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(err.to_string())
}

/// Per-flavor glue between zbus interface types and the adapter.
#[async_trait]
pub trait FlavorEndpoints: Send + Sync + 'static {
    async fn export_root(server: &ObjectServer, path: &str, adapter: HostAdapter) -> zbus::Result<()>;

    async fn unexport_root(server: &ObjectServer, path: &str) -> zbus::Result<()>;

    async fn unexport_connection(server: &ObjectServer, path: &str) -> zbus::Result<()>;

    async fn emit(emitter: &SignalEmitter<'_>, signal: &HookSignal) -> zbus::Result<()>;
}

macro_rules! flavor_endpoints {
    ($module:ident, $connection_iface:tt, $plugin_iface:tt) => {
        pub mod $module {
            use hook_protocol::{ClientIdentity, HandlerId, HookKind, HookSignal};
            use tracing::{info, warn};
            use zbus::{interface, object_server::SignalEmitter, ObjectServer};

            use super::{failed, FlavorEndpoints};
            use crate::host::{adapter::HostAdapter, connection::HookCall};

            /// Connection interface; `path` is `None` on the root object.
            pub struct Remote {
                adapter: HostAdapter,
                path: Option<String>,
            }

            #[interface(name = $connection_iface)]
            impl Remote {
                async fn connect(
                    &self,
                    filename: String,
                    name: String,
                    description: String,
                    version: String,
                    #[zbus(object_server)] server: &ObjectServer,
                ) -> zbus::fdo::Result<String> {
                    let identity = ClientIdentity { filename, name, description, version };
                    let Some(record) = self.adapter.connect(self.path.as_deref(), identity).await else {
                        return Ok(String::new());
                    };
                    if let Err(err) = export_connection(server, &record.path, &self.adapter).await {
                        warn!(path = %record.path, "❌ failed to export connection: {err}");
                        self.adapter.disconnect(Some(&record.path)).await;
                        return Err(err.into());
                    }
                    Ok(record.path)
                }

                async fn disconnect(&self) {
                    if !self.adapter.disconnect(self.path.as_deref()).await {
                        info!("ignoring Disconnect on {}", self.path.as_deref().unwrap_or("the root object"));
                    }
                }
            }

            pub struct Plugin {
                adapter: HostAdapter,
                path: String,
            }

            impl Plugin {
                async fn hook(&self, kind: HookKind, key: String, priority: i32, help: Option<String>, eat: i32) -> zbus::fdo::Result<u32> {
                    let call = HookCall { kind, key, priority, help, eat };
                    self.adapter.hook(&self.path, call).await.map(HandlerId::get).map_err(failed)
                }
            }

            #[interface(name = $plugin_iface)]
            impl Plugin {
                async fn command(&self, command: String) -> zbus::fdo::Result<()> {
                    self.adapter.command(&self.path, &command).await.map_err(failed)
                }

                async fn print(&self, text: String) -> zbus::fdo::Result<()> {
                    self.adapter.print(&self.path, &text).await.map_err(failed)
                }

                async fn get_info(&self, id: String) -> zbus::fdo::Result<String> {
                    self.adapter.get_info(&self.path, &id).await.map_err(failed)
                }

                #[zbus(out_args("status", "string_value", "int_value"))]
                async fn get_prefs(&self, name: String) -> zbus::fdo::Result<(i32, String, i32)> {
                    let value = self.adapter.get_prefs(&self.path, &name).await.map_err(failed)?;
                    Ok(value.to_wire())
                }

                async fn hook_command(&self, command: String, priority: i32, help: String, eat: i32) -> zbus::fdo::Result<u32> {
                    let help = Some(help).filter(|h| !h.is_empty());
                    self.hook(HookKind::Command, command, priority, help, eat).await
                }

                async fn hook_server(&self, event: String, priority: i32, eat: i32) -> zbus::fdo::Result<u32> {
                    self.hook(HookKind::Server, event, priority, None, eat).await
                }

                async fn hook_print(&self, event: String, priority: i32, eat: i32) -> zbus::fdo::Result<u32> {
                    self.hook(HookKind::Print, event, priority, None, eat).await
                }

                async fn unhook(&self, id: u32) -> zbus::fdo::Result<()> {
                    self.adapter.unhook(&self.path, HandlerId::new(id)).await.map_err(failed)
                }

                async fn list_get(&self, name: String) -> zbus::fdo::Result<u32> {
                    self.adapter.list_get(&self.path, &name).await.map_err(failed)
                }

                async fn list_next(&self, id: u32) -> zbus::fdo::Result<bool> {
                    self.adapter.list_next(&self.path, id).await.map_err(failed)
                }

                async fn list_str(&self, id: u32, name: String) -> zbus::fdo::Result<String> {
                    self.adapter.list_str(&self.path, id, &name).await.map_err(failed)
                }

                async fn list_int(&self, id: u32, name: String) -> zbus::fdo::Result<i32> {
                    self.adapter.list_int(&self.path, id, &name).await.map_err(failed)
                }

                async fn list_free(&self, id: u32) -> zbus::fdo::Result<()> {
                    self.adapter.list_free(&self.path, id).await.map_err(failed)
                }

                #[zbus(signal)]
                async fn command_signal(
                    emitter: &SignalEmitter<'_>,
                    words: &[String],
                    words_eol: &[String],
                    id: u32,
                    context: &str,
                ) -> zbus::Result<()>;

                #[zbus(signal)]
                async fn server_signal(
                    emitter: &SignalEmitter<'_>,
                    words: &[String],
                    words_eol: &[String],
                    id: u32,
                    context: &str,
                ) -> zbus::Result<()>;

                #[zbus(signal)]
                async fn print_signal(emitter: &SignalEmitter<'_>, words: &[String], id: u32, context: &str) -> zbus::Result<()>;

                #[zbus(signal)]
                async fn unload_signal(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;
            }

            async fn export_connection(server: &ObjectServer, path: &str, adapter: &HostAdapter) -> zbus::Result<()> {
                let remote = Remote { adapter: adapter.clone(), path: Some(path.to_owned()) };
                server.at(path, remote).await?;
                let plugin = Plugin { adapter: adapter.clone(), path: path.to_owned() };
                server.at(path, plugin).await?;
                Ok(())
            }

            pub struct Endpoints;

            #[async_trait::async_trait]
            impl FlavorEndpoints for Endpoints {
                async fn export_root(server: &ObjectServer, path: &str, adapter: HostAdapter) -> zbus::Result<()> {
                    server.at(path, Remote { adapter, path: None }).await?;
                    Ok(())
                }

                async fn unexport_root(server: &ObjectServer, path: &str) -> zbus::Result<()> {
                    server.remove::<Remote, _>(path).await?;
                    Ok(())
                }

                async fn unexport_connection(server: &ObjectServer, path: &str) -> zbus::Result<()> {
                    server.remove::<Plugin, _>(path).await?;
                    server.remove::<Remote, _>(path).await?;
                    Ok(())
                }

                async fn emit(emitter: &SignalEmitter<'_>, signal: &HookSignal) -> zbus::Result<()> {
                    match signal {
                        HookSignal::Command { id, event } => {
                            Plugin::command_signal(emitter, &event.words, &event.words_eol, id.get(), &event.context).await
                        }
                        HookSignal::Server { id, event } => {
                            Plugin::server_signal(emitter, &event.words, &event.words_eol, id.get(), &event.context).await
                        }
                        HookSignal::Print { id, event } => {
                            Plugin::print_signal(emitter, &event.words, id.get(), &event.context).await
                        }
                        HookSignal::Unload => Plugin::unload_signal(emitter).await,
                    }
                }
            }
        }
    };
}

flavor_endpoints!(xchat, "org.xchat.connection", "org.xchat.plugin");
flavor_endpoints!(hexchat, "org.hexchat.connection", "org.hexchat.plugin");
flavor_endpoints!(weechat, "tak.weebus.connection", "tak.weebus.plugin");

/// Pick the endpoint types for a runtime flavor.
macro_rules! with_endpoints {
    ($flavor:expr, $e:ident => $body:expr) => {
        match $flavor {
            Flavor::Xchat => {
                type $e = xchat::Endpoints;
                $body
            }
            Flavor::Hexchat => {
                type $e = hexchat::Endpoints;
                $body
            }
            Flavor::Weechat => {
                type $e = weechat::Endpoints;
                $body
            }
        }
    };
}

/// Emits adapter signals from the exported connection objects.
pub struct DbusSink<E> {
    conn: Connection,
    _endpoints: PhantomData<fn() -> E>,
}

impl<E> DbusSink<E> {
    pub fn new(conn: Connection) -> Self {
        Self { conn, _endpoints: PhantomData }
    }
}

#[async_trait]
impl<E: FlavorEndpoints> SignalSink for DbusSink<E> {
    async fn emit(&self, path: &str, signal: &HookSignal) -> BridgeResult<()> {
        let emitter = SignalEmitter::new(&self.conn, path).map_err(|e| BridgeError::TransportUnavailable(e.to_string()))?;
        E::emit(&emitter, signal)
            .await
            .map_err(|e| BridgeError::TransportUnavailable(e.to_string()))
    }

    async fn release(&self, path: &str) -> BridgeResult<()> {
        E::unexport_connection(self.conn.object_server(), path)
            .await
            .map_err(|e| BridgeError::TransportUnavailable(e.to_string()))
    }
}

/// A host adapter served on a bus under its flavor's well-known name.
pub struct DbusHost {
    conn: Connection,
    adapter: HostAdapter,
}

impl DbusHost {
    pub async fn serve(bus: BusKind, identity: BusIdentity, host: Box<dyn NativeHost>) -> Result<Self> {
        let conn = bus.connect().await.with_context(|| format!("connecting to the {bus} bus"))?;
        let adapter = with_endpoints!(identity.flavor, E => {
            let sink: Arc<dyn SignalSink> = Arc::new(DbusSink::<E>::new(conn.clone()));
            let adapter = HostAdapter::new(host, identity.clone(), sink);
            E::export_root(conn.object_server(), &identity.object, adapter.clone())
                .await
                .with_context(|| format!("exporting {}", identity.object))?;
            adapter
        });
        conn.request_name(identity.service.as_str())
            .await
            .with_context(|| format!("requesting bus name {}", identity.service))?;
        info!(service = %identity.service, object = %identity.object, "📡 serving on the {bus} bus");
        Ok(Self { conn, adapter })
    }

    pub fn adapter(&self) -> &HostAdapter {
        &self.adapter
    }

    /// Unload every client, wait `grace` for them to say goodbye, then drop
    /// every object and the bus name.
    pub async fn shutdown(self, grace: std::time::Duration) -> Result<()> {
        self.adapter.unload().await;
        tokio::time::sleep(grace).await;
        self.adapter.shutdown().await;

        let identity = self.adapter.identity().clone();
        with_endpoints!(identity.flavor, E => {
            if let Err(err) = E::unexport_root(self.conn.object_server(), &identity.object).await {
                warn!("❌ failed to unexport {}: {err}", identity.object);
            }
        });
        if let Err(err) = self.conn.release_name(identity.service.as_str()).await {
            warn!("❌ failed to release {}: {err}", identity.service);
        }
        Ok(())
    }
}
