#[tokio::main]
async fn main() {
    quick_translator::run().await;
}
