fn main() -> anyhow::Result<()> {
    zen_docs::cli::run()
}
