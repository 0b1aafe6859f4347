pub mod cache;
pub mod command;
pub mod error;
pub mod export;
pub mod market_data;
pub mod registry;
pub mod tool;

pub use cache::ResultCache;
pub use command::{CommandTool, PluginOutput};
pub use error::ToolError;
pub use export::{
    export_report, register_builtin_exporters, ExportPlugin, ExportTool, JsonExporter,
    MarkdownExporter,
};
pub use market_data::{MarketDataReader, MarketDataTool, MARKET_DATA_DDL};
pub use registry::ToolRegistry;
pub use tool::{query_str, Tool};

use std::sync::Arc;

use analyst_models::ToolsConfig;

/// Build a registry from configuration: the market-data reader when configured,
/// every external plugin, and the built-in exporters.
pub fn build_registry(config: &ToolsConfig, pretty_json: bool) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::from_config(config);
    register_builtin_exporters(&mut registry, pretty_json);

    if let Some(market_data) = &config.market_data {
        registry.register(Arc::new(MarketDataTool::open(&market_data.sqlite_path)?));
    }
    for plugin in &config.plugins {
        registry.register(Arc::new(CommandTool::from_config(plugin)));
    }
    Ok(registry)
}
