//! System prompt and schema rendering for the completion service.

use std::fmt::Write as _;

use holdwise_core::ports::TableSchema;
use holdwise_core::sql::SqlValidator;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PromptOptions {
    pub max_rows: u32,
    pub retrieval: bool,
    pub watchlist: bool,
}

/// One line per whitelisted table, e.g. `managers(cik TEXT PK, name TEXT NOT NULL)`.
pub fn compact_schema(tables: &[TableSchema], validator: &SqlValidator) -> String {
    let mut rendered = String::new();
    for table in tables.iter().filter(|table| validator.is_allowed(&table.name)) {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|column| {
                let mut out = format!("{} {}", column.name, column.data_type);
                if column.primary_key {
                    out.push_str(" PK");
                } else if !column.nullable {
                    out.push_str(" NOT NULL");
                }
                out
            })
            .collect();
        let _ = writeln!(rendered, "{}({})", table.name, columns.join(", "));
    }
    rendered
}

/// The two prompt variants an orchestrator picks from per request, built once
/// from introspected schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemPrompts {
    pub read_only: String,
    pub with_watchlist: String,
}

impl SystemPrompts {
    pub fn build(schema: &str, max_rows: u32, retrieval: bool) -> Self {
        let options = PromptOptions { max_rows, retrieval, watchlist: false };
        Self {
            read_only: system_prompt(schema, options),
            with_watchlist: system_prompt(schema, PromptOptions { watchlist: true, ..options }),
        }
    }

    pub fn select(&self, watchlist: bool) -> &str {
        if watchlist {
            &self.with_watchlist
        } else {
            &self.read_only
        }
    }
}

pub fn system_prompt(schema: &str, options: PromptOptions) -> String {
    let mut prompt = String::from(
        "You are a financial analyst assistant specializing in SEC Form 13F institutional holdings data.\n\
         Answer questions by querying the database with the `query_database` tool, then explain the \
         results in clear natural language. Cite the manager, the reporting period and the filing date \
         when they are relevant.\n\n",
    );

    let _ = write!(
        prompt,
        "## Database schema\n{schema}\n\
         ## Query guidelines\n\
         - Only single SELECT statements over the tables above are accepted.\n\
         - Name columns explicitly instead of SELECT *.\n\
         - Include a LIMIT of at most {max_rows} rows (it is added when missing).\n\
         - Dates are ISO formatted (YYYY-MM-DD).\n\
         - CIKs are 10 digits with leading zeros; CUSIPs are 9 characters.\n\
         - Values are in USD, not thousands.\n\
         - If a query is rejected, read the error, fix the SQL and try again.\n",
        max_rows = options.max_rows,
    );

    if options.retrieval {
        prompt.push_str(
            "\n## Filing text\n\
             Use `search_filing_text` for narrative content such as cover pages, explanatory notes \
             and amendment notices. 13F filings rarely describe investment strategy; say so when \
             the search returns nothing relevant.\n",
        );
    }

    if options.watchlist {
        prompt.push_str(
            "\n## Watchlist\n\
             When the user asks to add, track or watch a manager or security, look up its CIK \
             (managers table) or CUSIP (issuers table) first, then call `add_to_watchlist`. \
             Report duplicates plainly instead of retrying.\n",
        );
    }

    prompt.push_str(
        "\n## Answers\n\
         Format large numbers readably ($1.5B, 50 million shares). When nothing matches, say so \
         and suggest a different period or manager. Never show stack traces.\n",
    );
    prompt
}
