use anyhow::Result;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use hookbus::{
    config::BridgeConfig,
    host::{
        dbus::DbusHost,
        native::NativeHost,
        scripted::{parse_line, ConsoleInput, ScriptedHost},
    },
};

#[derive(Args, Debug)]
pub struct HostArgs {
    /// Nick reported through GetInfo
    #[arg(long)]
    pub nick: Option<String>,

    /// Initial context (channel) of native events
    #[arg(long)]
    pub context: Option<String>,
}

pub async fn execute(args: HostArgs, config: BridgeConfig) -> Result<()> {
    let mut host = ScriptedHost::new().with_echo(true);
    if let Some(nick) = &args.nick {
        host.set_info("nick", nick);
    }
    if let Some(context) = &args.context {
        host.set_context(context);
    }
    let mut context = host.context().to_owned();

    let served = DbusHost::serve(config.bus, config.flavor.identity(), Box::new(host)).await?;
    let adapter = served.adapter().clone();
    println!("hookbus host running as {}; type `help` for input syntax, Ctrl-C to exit", adapter.identity().service);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("stdin closed");
            break;
        };
        if line.trim().eq_ignore_ascii_case("help") {
            println!("command <text> | server <raw line> | print <event>|<arg>|... | context <name> | unload");
            continue;
        }
        match parse_line(&line, &context) {
            Ok(ConsoleInput::Event(event)) => {
                let eat = adapter.dispatch(&event).await;
                info!(kind = %event.kind, key = %event.key, %eat, "event handled");
            }
            Ok(ConsoleInput::SetContext(next)) => {
                if adapter.with_host(|h| h.set_context(&next)).await {
                    context = next;
                }
            }
            Ok(ConsoleInput::Unload) => break,
            Ok(ConsoleInput::Blank) => {}
            Err(err) => warn!("{err:#}"),
        }
    }

    served.shutdown(config.unload_grace).await?;
    println!("Goodbye!");
    Ok(())
}
