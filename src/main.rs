#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let name_filter = std::env::args().nth(1);
    if let Err(e) = turantalim_homework::run(name_filter).await {
        eprintln!("homework-review fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
