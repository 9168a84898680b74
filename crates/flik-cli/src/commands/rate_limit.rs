//! `flik rate-limit` command implementation

use crate::api::ApiClient;
use crate::error::Result;
use crate::output::render_rate_limit;

pub async fn run(server_url: String) -> Result<()> {
    let client = ApiClient::new(server_url)?;
    let status = client.rate_limit().await?;
    println!("{}", render_rate_limit(&status));
    Ok(())
}
