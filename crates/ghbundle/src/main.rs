fn main() -> anyhow::Result<()> {
    ghbundle::cli::run()
}
