use episode_stream::observability::init_observability;
use episode_stream::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    let _ = dotenvy::dotenv();
    init_observability();

    let story = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "A lighthouse keeper befriends a lost whale.".to_string());
    let client = GenerationClient::from_env()?;
    let request = EpisodeRequest::new(story, serde_json::json!({"_id": "demo-character"}), "dummy")
        .art_style(ArtStyle::Cartoon)
        .resolution(Resolution::P720);

    let mut run = client.spawn(&request)?;
    while let Some(state) = run.next_state().await {
        if let Some(message) = state.latest_message() {
            println!("[{:>3}%] {message}", state.percent);
        }
    }

    let state = run.finish().await?;
    match state.status {
        GenerationStatus::Completed => {
            let payload = serde_json::Value::Object(state.final_payload.unwrap_or_default());
            println!("completed: {payload}");
        }
        GenerationStatus::Failed => eprintln!("generation failed: {}", state.error.unwrap_or_default()),
        status => eprintln!("stream ended while {status:?}"),
    }
    Ok(())
}
