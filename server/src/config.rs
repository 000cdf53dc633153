use clap::Parser;

/// CLI surface from spec §6. Every flag is overridable by an environment
/// variable of the same intent, checked after arg parsing so `ENABLE_*`
/// can flip a feature without touching the launch command.
#[derive(Parser, Debug, Clone)]
#[command(name = "snake_arena_server")]
pub struct Args {
    #[arg(long)]
    pub disable_chat: bool,

    #[arg(long)]
    pub enable_powerups: bool,

    #[arg(long)]
    pub disable_accessibility: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FeatureFlags {
    pub chat: bool,
    pub powerups: bool,
    pub accessibility: bool,
}

impl FeatureFlags {
    pub fn from_args(args: &Args) -> Self {
        let mut chat = !args.disable_chat;
        let mut powerups = args.enable_powerups;
        let mut accessibility = !args.disable_accessibility;

        if let Some(v) = env_bool("ENABLE_CHAT") {
            chat = v;
        }
        if let Some(v) = env_bool("ENABLE_POWERUPS") {
            powerups = v;
        }
        if let Some(v) = env_bool("ENABLE_ACCESSIBILITY") {
            accessibility = v;
        }

        Self {
            chat,
            powerups,
            accessibility,
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    match std::env::var(key).ok()?.to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

pub fn listen_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000)
}
