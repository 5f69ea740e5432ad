use std::process::ExitCode;

fn main() -> ExitCode {
    match account_pool_hub_lib::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("account-pool-hub: {err}");
            ExitCode::FAILURE
        }
    }
}
