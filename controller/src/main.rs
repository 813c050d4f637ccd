#[cfg(feature = "esp32")]
mod esp;
#[cfg(feature = "esp32")]
mod hardware;
#[cfg(not(feature = "esp32"))]
mod host;
mod web;

#[cfg(not(feature = "esp32"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}

#[cfg(feature = "esp32")]
fn main() -> anyhow::Result<()> {
    esp::run()
}
