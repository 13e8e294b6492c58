use anyhow::Result;

fn main() -> Result<()> {
    emv_tester::cli::commands::run_cli()
}
