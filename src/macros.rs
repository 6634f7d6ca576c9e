#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

#[macro_export]
macro_rules! seq {
    ($($term:expr),* $(,)?) => {
        $crate::Term::Seq(vec![ $($term),* ])
    };
}

#[macro_export]
macro_rules! oneof {
    ($($term:expr),* $(,)?) => {
        $crate::Term::Oneof(vec![ $($term),* ])
    };
}

#[macro_export]
macro_rules! stack {
    ($($term:expr),* $(,)?) => {
        $crate::Term::Stack(vec![ $($term),* ])
    };
}

/// Build a [`Grammar`](crate::Grammar) from `"name" => term` pairs.
#[macro_export]
macro_rules! grammar {
    ($($name:expr => $term:expr),* $(,)?) => {{
        let mut g = $crate::Grammar::new();
        $( g.insert($name, $term); )*
        g
    }};
}
