//! ---
//! bl_section: "02-logging"
//! bl_subsection: "module"
//! bl_type: "source"
//! bl_scope: "code"
//! bl_description: "Lease-scoped structured logging helpers."
//! bl_version: "v0.1.0"
//! bl_owner: "tbd"
//! ---

#[doc(hidden)]
pub use tracing as __tracing;

#[doc(hidden)]
#[macro_export]
macro_rules! __lease_event {
    ($lvl:expr, $ctx:expr, event = $event:expr, outcome = $outcome:expr, $($arg:tt)+) => {{
        let ctx = $ctx;
        $crate::macros::__tracing::event!(
            $lvl,
            event = $event,
            outcome = $outcome,
            account = ctx.account.unwrap_or(""),
            container = ctx.container.unwrap_or(""),
            name = ctx.name.unwrap_or(""),
            token = ctx.token.unwrap_or(""),
            operation = ctx.operation.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
    ($lvl:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = $ctx;
        $crate::macros::__tracing::event!(
            $lvl,
            account = ctx.account.unwrap_or(""),
            container = ctx.container.unwrap_or(""),
            name = ctx.name.unwrap_or(""),
            token = ctx.token.unwrap_or(""),
            operation = ctx.operation.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with lease context.
#[macro_export]
macro_rules! lease_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__lease_event!($crate::macros::__tracing::Level::INFO, &$ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__lease_event!(
            $crate::macros::__tracing::Level::INFO,
            &$crate::LeaseLogContext::default(),
            $($arg)+
        )
    };
}

/// Emit a debug log enriched with lease context.
#[macro_export]
macro_rules! lease_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__lease_event!($crate::macros::__tracing::Level::DEBUG, &$ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__lease_event!(
            $crate::macros::__tracing::Level::DEBUG,
            &$crate::LeaseLogContext::default(),
            $($arg)+
        )
    };
}

/// Emit a warning enriched with lease context.
#[macro_export]
macro_rules! lease_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__lease_event!($crate::macros::__tracing::Level::WARN, &$ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__lease_event!(
            $crate::macros::__tracing::Level::WARN,
            &$crate::LeaseLogContext::default(),
            $($arg)+
        )
    };
}

/// Emit an error log enriched with lease context.
#[macro_export]
macro_rules! lease_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__lease_event!($crate::macros::__tracing::Level::ERROR, &$ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__lease_event!(
            $crate::macros::__tracing::Level::ERROR,
            &$crate::LeaseLogContext::default(),
            $($arg)+
        )
    };
}
