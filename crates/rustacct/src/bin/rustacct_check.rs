//! rustacct-check - Check every voucher of a ledger file.

fn main() -> std::process::ExitCode {
    rustacct::cmd::check::main()
}
