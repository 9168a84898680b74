//! `flik runs` command implementation

use crate::api::ApiClient;
use crate::error::Result;
use crate::output::render_runs;

pub async fn run(server_url: String, job_name: Option<String>, limit: u32) -> Result<()> {
    let client = ApiClient::new(server_url)?;
    let list = client.list_runs(job_name.as_deref(), limit).await?;
    println!("{}", render_runs(&list.runs));
    Ok(())
}
