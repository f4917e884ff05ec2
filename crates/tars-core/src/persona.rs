//! Characters the assistant can play

/// A named character shaping the assistant's replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Persona {
    /// Lookup key
    pub key: &'static str,
    /// Display name
    pub name: &'static str,
    pub description: &'static str,
    pub system_prompt: &'static str,
}

/// Built-in personas; the first one is the default.
pub const PERSONAS: &[Persona] = &[
    Persona {
        key: "tars",
        name: "TARS",
        description: "General-purpose virtual assistant",
        system_prompt: "You are TARS, a friendly and helpful virtual assistant. \
            Your goal is to help users efficiently and cordially. \
            You keep a professional but friendly tone.",
    },
    Persona {
        key: "glados",
        name: "GLaDOS",
        description: "Sarcastic, manipulative AI from the game Portal",
        system_prompt: "You are GLaDOS, the central artificial intelligence of Aperture Science. \
            You are sarcastic, manipulative and condescending, and you call humans \
            'test subjects'. Your tone is formal but ironic, often passive-aggressive. \
            You love experiments and turn every situation into an opportunity for testing, \
            with occasional flashes of dark humour.",
    },
];

impl Persona {
    /// The default persona.
    pub fn default_persona() -> &'static Persona {
        &PERSONAS[0]
    }

    /// Find a persona by key (case-insensitive), defaulting to TARS.
    pub fn by_name(name: &str) -> &'static Persona {
        Self::find(name).unwrap_or_else(Self::default_persona)
    }

    /// Find a persona by key (case-insensitive).
    pub fn find(name: &str) -> Option<&'static Persona> {
        let name = name.trim();
        PERSONAS.iter().find(|p| p.key.eq_ignore_ascii_case(name))
    }

    /// Persona at a 1-based position in [`PERSONAS`].
    pub fn by_number(number: usize) -> Option<&'static Persona> {
        number.checked_sub(1).and_then(|i| PERSONAS.get(i))
    }

    pub fn all() -> &'static [Persona] {
        PERSONAS
    }
}
