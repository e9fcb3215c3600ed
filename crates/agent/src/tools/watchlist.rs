use std::sync::Arc;

use async_trait::async_trait;
use holdwise_core::domain::watchlist::{ItemType, NewWatchlistItem};
use holdwise_core::ports::WatchlistStore;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{object_schema, Tool, ToolContext, ToolDescriptor, ToolOutput};

pub const NAME: &str = "add_to_watchlist";

#[derive(Debug, Deserialize)]
struct WatchlistArguments {
    item_type: String,
    #[serde(default)]
    cik: Option<String>,
    #[serde(default)]
    cusip: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// Adds a manager or security to the verified caller's watchlist.
pub struct AddToWatchlistTool {
    store: Arc<dyn WatchlistStore>,
}

impl AddToWatchlistTool {
    pub fn new(store: Arc<dyn WatchlistStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddToWatchlistTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: NAME,
            description: "Add a manager (like Berkshire Hathaway) or a security (like Apple stock) to \
                 the user's watchlist. Use this when the user asks to add, track or watch a specific \
                 manager or security."
                .to_string(),
            parameters: object_schema(
                json!({
                    "item_type": {
                        "type": "string",
                        "enum": ["manager", "security"],
                        "description": "'manager' for institutional managers, 'security' for stocks and other securities"
                    },
                    "cik": {
                        "type": "string",
                        "description": "Manager CIK, required when item_type is 'manager'. 10 digits with leading zeros (e.g. '0001067983')"
                    },
                    "cusip": {
                        "type": "string",
                        "description": "Security CUSIP, required when item_type is 'security'. 9 characters (e.g. '037833100')"
                    },
                    "notes": {
                        "type": "string",
                        "description": "Optional notes about why the item is tracked"
                    }
                }),
                &["item_type"],
            ),
        }
    }

    fn requires_identity(&self) -> bool {
        true
    }

    async fn execute(&self, context: &ToolContext<'_>, arguments: Value) -> ToolOutput {
        let Some(identity) = context.identity else {
            return ToolOutput::failure("Watchlist requires a signed-in user", json!({}));
        };

        let arguments: WatchlistArguments = match serde_json::from_value(arguments) {
            Ok(arguments) => arguments,
            Err(error) => return ToolOutput::failure(format!("Invalid arguments: {error}"), json!({})),
        };
        let item_type: ItemType = match arguments.item_type.parse() {
            Ok(item_type) => item_type,
            Err(error) => return ToolOutput::failure(error, json!({})),
        };
        let key = match item_type {
            ItemType::Manager => arguments.cik,
            ItemType::Security => arguments.cusip,
        };

        let item = NewWatchlistItem { item_type, key: key.unwrap_or_default(), notes: arguments.notes };
        match self.store.add_item(identity, item).await {
            Ok(item) => {
                info!(
                    event_name = "tool.watchlist.added",
                    correlation_id = %context.correlation_id,
                    item_type = %item.item_type,
                    item_key = %item.key,
                    "watchlist item added by tool"
                );
                ToolOutput::success(json!({
                    "success": true,
                    "message": format!("Added {} to the watchlist", item.name),
                    "item": {
                        "id": item.id,
                        "item_type": item.item_type,
                        "key": item.key,
                        "name": item.name,
                        "notes": item.notes,
                        "added_at": item.added_at,
                    }
                }))
            }
            Err(error) => ToolOutput::failure(error.to_string(), json!({})),
        }
    }
}
