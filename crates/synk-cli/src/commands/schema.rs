use std::sync::Arc;

use synk_core::integrations::{KeyringIdentity, NotionApi, NotionClient};
use synk_core::sync::mapper::DatabaseLayout;
use synk_core::Config;

pub fn run(database_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let notion = NotionClient::with_base_url(
        Arc::new(KeyringIdentity::new(&config.google.token_url)),
        &config.notion.api_base,
        &config.notion.version,
        config.sync.request_timeout(),
    );

    let rt = tokio::runtime::Runtime::new()?;
    let schema = rt.block_on(notion.get_schema(database_id))?;
    let layout = DatabaseLayout::resolve(database_id, &schema, &config.notion.property_names())?;

    let or_none = |name: Option<String>| name.unwrap_or_else(|| "(none)".to_string());
    println!("Title:       {}", layout.title);
    println!("Date:        {}", layout.date);
    println!("Description: {}", or_none(layout.description));
    println!("Link:        {}", or_none(layout.link));
    Ok(())
}
