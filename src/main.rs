use syslog_ingest::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::main().await
}
