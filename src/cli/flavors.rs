use anyhow::Result;
use clap::Args;
use hookbus::protocol::Flavor;
use strum::IntoEnumIterator;

#[derive(Args, Debug, Default)]
pub struct FlavorsArgs {
    /// Print the bus identities as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: &FlavorsArgs) -> Result<()> {
    let identities: Vec<_> = Flavor::iter().map(Flavor::identity).collect();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&identities)?);
        return Ok(());
    }
    println!("{:<8} {:<20} {:<20} {:<24} {}", "flavor", "service", "object", "connection", "plugin");
    for id in identities {
        println!(
            "{:<8} {:<20} {:<20} {:<24} {}",
            id.flavor.as_ref(),
            id.service,
            id.object,
            id.connection_interface,
            id.plugin_interface
        );
    }
    Ok(())
}
