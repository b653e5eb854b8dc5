//! Categories command
//!
//! Lists the fixed set of tracked usage categories.

use anyhow::Result;
use grok_monitor_core::Category;
use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::output::print_output;

/// Category row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct CategoryRow {
    #[tabled(rename = "Code")]
    pub code: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Color")]
    pub color: String,
}

impl From<Category> for CategoryRow {
    fn from(category: Category) -> Self {
        let info = category.info();
        Self {
            code: category.code().to_string(),
            name: info.name.to_string(),
            color: info.color.to_string(),
        }
    }
}

pub fn execute(ctx: &Context) -> Result<()> {
    let rows: Vec<CategoryRow> = Category::ALL.into_iter().map(CategoryRow::from).collect();
    print_output(&rows, ctx.format)
}
