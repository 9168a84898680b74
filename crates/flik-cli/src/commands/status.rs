//! `flik status` command implementation

use crate::api::ApiClient;
use crate::error::Result;
use crate::output::render_status;
use uuid::Uuid;

pub async fn run(server_url: String, run_id: Uuid) -> Result<()> {
    let client = ApiClient::new(server_url)?;
    let status = client.get_run(run_id).await?;
    print!("{}", render_status(&status));
    Ok(())
}
