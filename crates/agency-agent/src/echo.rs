//! Demo agent that streams the query back word by word

use agency_framework::prelude::{AgentUpdate, StreamingAgent};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use std::time::Duration;

/// Echoes the query with one progress update per word.
///
/// A blank query ends with an input-required update instead of an answer.
#[derive(Debug, Clone)]
pub struct EchoAgent {
    name: String,
    delay: Duration,
}

impl EchoAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::from_millis(50),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl StreamingAgent for EchoAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn stream_response(
        &self,
        query: String,
        _context_id: String,
        user_id: String,
    ) -> BoxStream<'static, AgentUpdate> {
        let words: Vec<String> = query.split_whitespace().map(str::to_string).collect();
        if words.is_empty() {
            return stream::iter(vec![AgentUpdate::needs_input(
                "What would you like me to echo?",
            )])
            .boxed();
        }

        let input_tokens = words.len() as u64;
        let mut updates: Vec<AgentUpdate> = words
            .iter()
            .enumerate()
            .map(|(i, word)| {
                let update = AgentUpdate::partial(format!("echoing: {}", word))
                    .with_tokens("output_tokens", 1);
                if i == 0 {
                    update.with_tokens("input_tokens", input_tokens)
                } else {
                    update
                }
            })
            .collect();

        let answer = if user_id.is_empty() {
            words.join(" ")
        } else {
            format!("{} (for {})", words.join(" "), user_id)
        };
        updates.push(AgentUpdate::final_answer(answer));

        let delay = self.delay;
        stream::iter(updates)
            .then(move |update| async move {
                tokio::time::sleep(delay).await;
                update
            })
            .boxed()
    }
}
