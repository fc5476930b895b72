//! CLI Status Command
//!
//! Reports server health and the current installation run.

use anyhow::Result;
use serde_json::Value;

pub async fn run(base_url: &str) -> Result<()> {
    let client = reqwest::Client::new();

    let health = match client.get(format!("{base_url}/api/health")).send().await {
        Ok(resp) => resp.json::<Value>().await?,
        Err(_) => {
            println!("boxinstall is not running at {base_url}");
            return Ok(());
        }
    };
    println!(
        "boxinstall {} at {base_url}: {}",
        health["version"].as_str().unwrap_or("?"),
        health["status"].as_str().unwrap_or("unknown"),
    );

    let status: Value = client
        .get(format!("{base_url}/api/install/status"))
        .send()
        .await?
        .json()
        .await?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    let last = client
        .get(format!("{base_url}/api/install/logs"))
        .send()
        .await?
        .json::<Vec<Value>>()
        .await?
        .pop();
    if let Some(record) = last {
        println!("Last progress record: {record}");
    }
    Ok(())
}
