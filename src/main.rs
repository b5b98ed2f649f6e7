#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zenview_lib::run().await
}
