//! Per-primitive façades and promise sugar.
//!
//! Every façade is a thin adapter over the registration, cancellation and
//! marking engines with a fixed [`OperationKind`](crate::OperationKind) and
//! a host wrapper. Each primitive gets the same control set, generated by
//! [`controls!`]:
//!
//! | primitive | register                 | controls suffix   |
//! |-----------|--------------------------|-------------------|
//! | timeout   | `set_timeout`            | `_timeout`        |
//! | interval  | `set_interval`           | `_interval`       |
//! | immediate | `set_immediate`          | `_immediate`      |
//! | idle      | `request_idle_callback`  | `_idle_callback`  |
//! | worker    | `worker`                 | `_worker`         |
//! | proxy     | `proxy`                  | `_proxy`          |
//! | listener  | `on` / `once`            | `_listener`       |
//! | promise   | `promise`                | `_promise`        |
//! | request   | `request`                | `_request`        |

/// Generates `clear_x / mute_x / unmute_x / suspend_x / unsuspend_x` for one kind.
macro_rules! controls {
    ($kind:expr, $name:literal, $clear:ident, $mute:ident, $unmute:ident, $suspend:ident, $unsuspend:ident) => {
        #[doc = concat!("Clears ", $name, " operations selected by `addr`.")]
        pub fn $clear(&self, addr: impl Into<$crate::core::Address>) -> usize {
            self.clear(&$kind, addr)
        }

        #[doc = concat!("Mutes ", $name, " operations: firings have no effect.")]
        pub fn $mute(&self, addr: impl Into<$crate::core::Address>) -> usize {
            self.mark(&$kind, $crate::core::Mark::Muted, addr)
        }

        #[doc = concat!("Unmutes ", $name, " operations.")]
        pub fn $unmute(&self, addr: impl Into<$crate::core::Address>) -> usize {
            self.mark(&$kind, $crate::core::Mark::Unmuted, addr)
        }

        #[doc = concat!("Suspends ", $name, " operations: one-shot firings are queued.")]
        pub fn $suspend(&self, addr: impl Into<$crate::core::Address>) -> usize {
            self.mark(&$kind, $crate::core::Mark::Paused, addr)
        }

        #[doc = concat!("Unsuspends ", $name, " operations and replays queued firings.")]
        pub fn $unsuspend(&self, addr: impl Into<$crate::core::Address>) -> usize {
            self.mark(&$kind, $crate::core::Mark::Unpaused, addr)
        }
    };
}

mod awaitable;
mod listener;
mod promise;
mod proxy;
mod sugar;
mod timers;
mod worker;

pub use awaitable::Awaitable;
pub use listener::EventNames;
pub use proxy::Proxy;
