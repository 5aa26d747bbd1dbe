use anyhow::Result;
use clap::Args;
use tracing::info;

use hookbus::{
    client::{dbus::DbusTransport, BridgeClient},
    config::BridgeConfig,
    protocol::{ClientIdentity, Priority},
};

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Name announced on Connect (default: HOOKBUS_CLIENT_NAME or `hookbus`)
    #[arg(long)]
    pub name: Option<String>,

    /// Command to tap, e.g. `BLAH`; repeatable
    #[arg(long = "command")]
    pub command: Vec<String>,

    /// Server message to tap, e.g. `PRIVMSG`; repeatable
    #[arg(long = "server")]
    pub server: Vec<String>,

    /// Print event to tap, e.g. `Your Message`; repeatable
    #[arg(long = "print")]
    pub print: Vec<String>,
}

pub async fn execute(args: ClientArgs, config: BridgeConfig) -> Result<()> {
    let identity = ClientIdentity {
        filename: std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        name: args.name.unwrap_or(config.client_name),
        description: "hookbus event tap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let transport = DbusTransport::open(config.bus, config.flavor.identity()).await?;
    let mut client = BridgeClient::connect(transport, identity, config.retry).await?;

    for command in &args.command {
        let handle = client.handle();
        let key = command.clone();
        client
            .hook_command(command, Priority::NORM, "hookbus tap", move |event| {
                let handle = handle.clone();
                let key = key.clone();
                async move {
                    info!(%key, context = %event.context, "command {:?}", event.words);
                    handle.print(&format!("tapped {key}: {}", event.words_eol.get(1).map_or("", String::as_str))).await;
                    anyhow::Ok(())
                }
            })
            .await;
    }
    for server in &args.server {
        let key = server.clone();
        client
            .hook_server(server, Priority::NORM, move |event| {
                let key = key.clone();
                async move {
                    info!(%key, context = %event.context, "server {:?}", event.words);
                    anyhow::Ok(())
                }
            })
            .await;
    }
    for print in &args.print {
        let key = print.clone();
        client
            .hook_print(print, Priority::NORM, move |event| {
                let key = key.clone();
                async move {
                    info!(%key, context = %event.context, "print {:?}", event.words);
                    anyhow::Ok(())
                }
            })
            .await;
    }
    info!(hooks = client.handler_count(), path = %client.path(), "🎧 listening");

    let reason = client
        .run_until(async {
            if tokio::signal::ctrl_c().await.is_err() {
                futures::future::pending::<()>().await;
            }
        })
        .await;
    println!("hookbus client stopped ({reason})");
    Ok(())
}
