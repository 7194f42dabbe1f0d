use std::time::Duration;
use taskq_client::TaskQueueClient;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Connecting to task queue...");
    let client = TaskQueueClient::connect("127.0.0.1:6379")?;

    println!("Submitting add(2, 3)...");
    let id = client.add(2, 3)?;
    println!("Invocation submitted with ID: {}", id);

    let result = client.wait_for_result(id, Duration::from_secs(30))?;
    match (result.value_json(), &result.error) {
        (Some(value), _) => println!("Result: {}", value),
        (None, Some(error)) => eprintln!("Task failed: {}", error),
        (None, None) => eprintln!("Task finished without a value"),
    }

    let data_dir = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());
    println!("Submitting run_violin({})...", data_dir);
    let id = client.run_violin(&data_dir)?;

    match client.wait_for_result(id, Duration::from_secs(300)) {
        Ok(result) if result.is_success() => {
            println!("Plot written to {}", result.value_json().unwrap_or_default())
        }
        Ok(result) => {
            if let Some(error) = result.error {
                eprintln!("Plot failed: {}", error);
            }
        }
        Err(e) => eprintln!("Gave up waiting: {}", e),
    }

    Ok(())
}
