//! Conversation state: persona, bounded memory and prompt assembly

use std::collections::VecDeque;

use crate::llm::Complete;
use crate::persona::Persona;
use crate::retrieve::is_error;
use crate::Result;

/// Exchanges remembered by default
pub const DEFAULT_MEMORY: usize = 10;

const RULES: &str = "You are a conversational assistant. Follow these rules:
1. Be concise and direct in your answers
2. Do not make up information that is not in the context
3. If you do not know something, admit it honestly
4. Keep a conversational and friendly tone
5. Do not use markdown formatting or numbered lists
6. Answer as if you were in a real conversation
7. Stay consistent with your previous answers";

/// One user message and the assistant's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

/// A conversation with one persona, remembering the latest exchanges.
pub struct Conversation {
    persona: &'static Persona,
    memory: VecDeque<Exchange>,
    capacity: usize,
}

impl Conversation {
    pub fn new(persona: &'static Persona) -> Self {
        Self::with_memory(persona, DEFAULT_MEMORY)
    }

    pub fn with_memory(persona: &'static Persona, capacity: usize) -> Self {
        Self {
            persona,
            memory: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn persona(&self) -> &'static Persona {
        self.persona
    }

    pub fn memory(&self) -> impl Iterator<Item = &Exchange> {
        self.memory.iter()
    }

    /// Build the completion prompt for `user`.
    ///
    /// Empty or failed retrieval context is left out.
    pub fn build_prompt(&self, user: &str, context: Option<&str>) -> String {
        let mut prompt = format!("{RULES}\n\n");
        prompt.push_str(&format!(
            "Act as {}. {}\n{}\n\n",
            self.persona.name, self.persona.description, self.persona.system_prompt
        ));

        if !self.memory.is_empty() {
            prompt.push_str("Conversation history:\n");
            for exchange in &self.memory {
                prompt.push_str(&format!(
                    "User: {}\nAssistant: {}\n\n",
                    exchange.user, exchange.assistant
                ));
            }
        }

        if let Some(context) = context.map(str::trim) {
            if !context.is_empty() && !is_error(context) {
                prompt.push_str(&format!("Relevant context:\n{context}\n\n"));
            }
        }

        prompt.push_str(&format!("User: {user}\n\nAssistant:"));
        prompt
    }

    /// Ask `client` for a reply and remember the exchange on success.
    pub fn respond<C: Complete + ?Sized>(
        &mut self,
        client: &C,
        user: &str,
        context: Option<&str>,
    ) -> Result<String> {
        let reply = client.complete(&self.build_prompt(user, context))?;
        self.remember(user, &reply);
        Ok(reply)
    }

    fn remember(&mut self, user: &str, assistant: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.memory.len() == self.capacity {
            self.memory.pop_front();
        }
        self.memory.push_back(Exchange {
            user: user.to_string(),
            assistant: assistant.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TarsError;
    use std::cell::RefCell;

    /// Replies "reply N" and records the prompts it saw.
    struct ScriptedClient {
        prompts: RefCell<Vec<String>>,
        fail: bool,
    }

    impl ScriptedClient {
        fn new() -> Self {
            Self {
                prompts: RefCell::new(Vec::new()),
                fail: false,
            }
        }
    }

    impl Complete for ScriptedClient {
        fn complete(&self, prompt: &str) -> Result<String> {
            if self.fail {
                return Err(TarsError::Llm("offline".to_string()));
            }
            let mut prompts = self.prompts.borrow_mut();
            prompts.push(prompt.to_string());
            Ok(format!("reply {}", prompts.len()))
        }
    }

    #[test]
    fn test_prompt_layout() {
        let conversation = Conversation::new(Persona::by_name("tars"));
        let prompt = conversation.build_prompt("What sat?", Some("The cat sat."));

        assert!(prompt.starts_with("You are a conversational assistant."));
        assert!(prompt.contains("Act as TARS."));
        assert!(prompt.contains("Relevant context:\nThe cat sat.\n\n"));
        assert!(prompt.ends_with("User: What sat?\n\nAssistant:"));
        assert!(!prompt.contains("Conversation history:"));
    }

    #[test]
    fn test_error_context_is_dropped() {
        let conversation = Conversation::new(Persona::by_name("tars"));
        let prompt = conversation.build_prompt(
            "hi",
            Some("[ERROR] Could not retrieve context: store unavailable"),
        );
        assert!(!prompt.contains("Relevant context"));
        assert!(!prompt.contains("store unavailable"));
    }

    #[test]
    fn test_memory_is_bounded() {
        let client = ScriptedClient::new();
        let mut conversation = Conversation::with_memory(Persona::by_name("glados"), 2);

        for question in ["one", "two", "three"] {
            conversation.respond(&client, question, None).unwrap();
        }

        let users: Vec<&str> = conversation.memory().map(|e| e.user.as_str()).collect();
        assert_eq!(users, vec!["two", "three"]);

        let last_prompt = client.prompts.borrow().last().cloned().unwrap();
        assert!(last_prompt.contains("User: one\nAssistant: reply 1"));
        assert!(last_prompt.contains("Act as GLaDOS."));
    }

    #[test]
    fn test_failed_reply_is_not_remembered() {
        let client = ScriptedClient {
            prompts: RefCell::new(Vec::new()),
            fail: true,
        };
        let mut conversation = Conversation::new(Persona::default_persona());

        assert!(conversation.respond(&client, "hi", None).is_err());
        assert_eq!(conversation.memory().count(), 0);
    }
}
