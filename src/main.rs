#[tokio::main]
async fn main() -> anyhow::Result<()> {
    presence_relay_lib::run().await
}
