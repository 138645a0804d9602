//! Known gateway model identifiers

/// Model the server selects when neither the session nor the request names
/// one.
pub const DEFAULT_MODEL: &str = "google-ai-studio/gemini-2.5-flash";

/// Catalog entry for a model reachable through the gateway
#[derive(Debug, Clone, Copy)]
pub struct ModelDef {
    pub id: &'static str,
    pub display_name: &'static str,
}

/// Models the gateway is known to route. Sessions may still name any model
/// id; the gateway passes unknown ids through and surfaces the provider's
/// rejection.
pub fn catalog() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "google-ai-studio/gemini-2.5-flash",
            display_name: "Gemini 2.5 Flash",
        },
        ModelDef {
            id: "google-ai-studio/gemini-2.0-flash",
            display_name: "Gemini 2.0 Flash",
        },
        ModelDef {
            id: "google-ai-studio/gemini-2.0-pro-exp",
            display_name: "Gemini 2.0 Pro (Experimental)",
        },
        ModelDef {
            id: "google-ai-studio/gemini-1.5-pro",
            display_name: "Gemini 1.5 Pro",
        },
        ModelDef {
            id: "google-ai-studio/gemini-1.5-flash",
            display_name: "Gemini 1.5 Flash",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_in_catalog() {
        assert!(catalog().iter().any(|m| m.id == DEFAULT_MODEL));
    }
}
