use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    mymy_cli::main_entry().await
}
