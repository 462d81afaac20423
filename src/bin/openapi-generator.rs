//! Print the OpenAPI document of the quiz room backend to stdout.

use anyhow::Context;
use quiz_rooms_back::services::documentation::ApiDoc;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    let doc = ApiDoc::openapi();
    let json = doc.to_pretty_json().context("serializing OpenAPI document")?;
    println!("{json}");
    Ok(())
}
