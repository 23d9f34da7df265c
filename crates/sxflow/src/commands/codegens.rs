use anyhow::Result;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::config::Config;

#[derive(Tabled)]
struct CodegenRow {
    name:  String,
    image: String,
}

pub async fn run(config: &Config, endpoint: Option<&str>, refresh: bool) -> Result<()> {
    let deliverer = super::connect(config, endpoint, config.deliver_options())?;
    let generators = deliverer.code_generators(refresh).await?;

    let rows = generators
        .into_iter()
        .map(|(name, image)| CodegenRow { name, image });
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}
