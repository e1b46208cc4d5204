use anyhow::Result;

fn main() -> Result<()> {
    devgate::cli::run()
}
