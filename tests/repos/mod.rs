pub mod test_repo;

/// Build file contents from string literals, one per line, newline terminated.
#[macro_export]
macro_rules! lines {
    ($($line:expr),* $(,)?) => {{
        let mut contents = String::new();
        $(
            contents.push_str($line);
            contents.push('\n');
        )*
        contents
    }};
}
