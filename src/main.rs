#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wa_pairbridge::cli::run().await
}
