/// Compile-time gated trace output. Both macros expand to nothing unless the
/// matching cargo feature (`trace_parser` / `trace_interpreter`) is enabled.

macro_rules! trace_parser {
    ($($arg:tt)*) => ({
        #[cfg(feature = "trace_parser")]
        println!("[parser] {}", format!($($arg)*));
    })
}

macro_rules! trace_interpreter {
    ($($arg:tt)*) => ({
        #[cfg(feature = "trace_interpreter")]
        println!("[eval] {}", format!($($arg)*));
    })
}

pub(crate) use {trace_interpreter, trace_parser};
