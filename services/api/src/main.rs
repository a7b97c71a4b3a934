use ta_allocation_api::run;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("ta-allocation-api: {err}");
        std::process::exit(1);
    }
}
