use blueprint_core::{BirthInput, BlueprintEngine};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Example usage
    let engine = BlueprintEngine::new();
    let input = BirthInput {
        full_name: "Ada Lovelace".to_string(),
        birth_date: "1990-03-21".to_string(),
        birth_time: Some("08:45".to_string()),
        birth_location: "London, UK".to_string(),
        timezone_hint: None,
    };

    match engine.calculate(&input).await {
        Ok(blueprint) => match serde_json::to_string_pretty(&blueprint) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: {:?}", e),
        },
        Err(e) => eprintln!("Error: {:?}", e),
    }
}
