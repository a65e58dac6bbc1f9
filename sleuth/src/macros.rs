/// Creates a single [`Utterance`](crate::Utterance) from a role shorthand.
///
/// ```rust
/// use sleuth::{Role, sl_utterance};
///
/// let utterance = sl_utterance!(assistant => "Three alerts fired.");
/// assert_eq!(utterance.role, Role::Assistant);
/// assert_eq!(utterance.text, "Three alerts fired.");
/// ```
#[macro_export]
macro_rules! sl_utterance {
    (system => $text:expr $(,)?) => {
        $crate::Utterance::new($crate::Role::System, $text)
    };
    (user => $text:expr $(,)?) => {
        $crate::Utterance::new($crate::Role::User, $text)
    };
    (assistant => $text:expr $(,)?) => {
        $crate::Utterance::new($crate::Role::Assistant, $text)
    };
    ($role:ident => $text:expr $(,)?) => {
        compile_error!("unsupported role: use system, user, or assistant");
    };
}

/// Creates a `Vec<Utterance>` history from role/text pairs.
///
/// ```rust
/// use sleuth::{Role, sl_history};
///
/// let history = sl_history![
///     user => "Show me yesterday's alerts.",
///     assistant => "Three alerts fired.",
/// ];
///
/// assert_eq!(history.len(), 2);
/// assert_eq!(history[1].role, Role::Assistant);
/// ```
#[macro_export]
macro_rules! sl_history {
    () => {
        Vec::<$crate::Utterance>::new()
    };
    ($($role:ident => $text:expr),+ $(,)?) => {
        vec![$($crate::sl_utterance!($role => $text)),+]
    };
}

/// Creates a [`Turn`](crate::Turn), optionally with history.
///
/// ```rust
/// use sleuth::sl_turn;
///
/// let turn = sl_turn!("conv-1", 2, "Why did it spike?", [
///     user => "Show alerts",
///     assistant => "Three fired.",
/// ]);
/// assert_eq!(turn.sequence, 2);
/// assert_eq!(turn.history.len(), 2);
/// ```
#[macro_export]
macro_rules! sl_turn {
    ($conversation:expr, $sequence:expr, $text:expr $(,)?) => {
        $crate::Turn::new($conversation, $sequence, $text)
    };
    ($conversation:expr, $sequence:expr, $text:expr, [$($history:tt)*] $(,)?) => {
        $crate::Turn::new($conversation, $sequence, $text)
            .with_history($crate::sl_history![$($history)*])
    };
}
