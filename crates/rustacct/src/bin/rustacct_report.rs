//! rustacct-report - Run subtotal reports over a ledger file.

fn main() -> std::process::ExitCode {
    rustacct::cmd::report_cmd::main()
}
