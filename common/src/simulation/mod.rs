pub mod player;
pub mod state;
pub mod tick;
pub mod win;

pub use player::{ControlScheme, Player, PlayerKind, Snake};
pub use state::{GameState, Mode, Winner};
pub use tick::{run_tick, DeathCause, SimEvent, TickOutcome};
pub use win::check_win_condition;
