/// Where a capture was requested: source file, line, and the enclosing
/// function's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
    /// Fully qualified path (`shop::billing::charge`); empty when unknown.
    pub function: &'static str,
}

impl CallSite {
    pub const fn new(file: &'static str, line: u32, function: &'static str) -> Self {
        Self {
            file,
            line,
            function,
        }
    }

    /// File and line of the caller. Pass the function path explicitly, or
    /// use [`call_site!`](crate::call_site) to have it derived.
    #[track_caller]
    pub fn caller(function: &'static str) -> Self {
        let location = std::panic::Location::caller();
        Self::new(location.file(), location.line(), function)
    }

    /// Last path segment of the function, used when no label is given.
    pub fn default_label(&self) -> &'static str {
        self.function
            .rsplit_once("::")
            .map_or(self.function, |(_, last)| last)
    }
}

/// Turns the type name of a marker fn nested in the caller into the caller's
/// path: drops the marker segment and any trailing closure segments (async
/// bodies and closures both show up as `{{closure}}`).
#[doc(hidden)]
pub fn __function_path(marker: &'static str) -> &'static str {
    let mut path = marker.strip_suffix("::__here").unwrap_or(marker);
    while let Some(outer) = path.strip_suffix("::{{closure}}") {
        path = outer;
    }
    path
}

/// Captures the current [`CallSite`]: `file!()`, `line!()`, and the path of
/// the enclosing function.
#[macro_export]
macro_rules! call_site {
    () => {{
        fn __here() {}
        $crate::CallSite::new(
            file!(),
            line!(),
            $crate::__function_path(::std::any::type_name_of_val(&__here)),
        )
    }};
}
