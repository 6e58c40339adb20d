use rask_remote_write::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::main().await
}
