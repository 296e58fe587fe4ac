//! `agent status` — probe a running server over HTTP.

use pa_domain::config::Config;

pub async fn status(config: &Config) -> anyhow::Result<()> {
    let base = format!("http://127.0.0.1:{}", config.server.port);
    let client = reqwest::Client::new();

    for path in ["/health", "/runtime/status"] {
        let url = format!("{base}{path}");
        match client.get(&url).send().await {
            Ok(resp) => {
                let status = resp.status();
                let body: serde_json::Value = resp.json().await.unwrap_or_default();
                println!("{path} [{status}]");
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
            Err(e) => {
                println!("{path}: unreachable ({e})");
            }
        }
    }
    Ok(())
}
