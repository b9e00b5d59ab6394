//! Extension to fence language tag mapping.

use std::collections::HashMap;

use once_cell::sync::Lazy;

static LANGUAGE_TAGS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("bash", "bash"),
        ("bat", "batch"),
        ("c", "c"),
        ("cc", "cpp"),
        ("cjs", "javascript"),
        ("clj", "clojure"),
        ("cpp", "cpp"),
        ("cs", "csharp"),
        ("css", "css"),
        ("cxx", "cpp"),
        ("dart", "dart"),
        ("erl", "erlang"),
        ("ex", "elixir"),
        ("exs", "elixir"),
        ("fs", "fsharp"),
        ("go", "go"),
        ("gradle", "groovy"),
        ("graphql", "graphql"),
        ("h", "c"),
        ("hh", "cpp"),
        ("hpp", "cpp"),
        ("hs", "haskell"),
        ("html", "html"),
        ("ini", "ini"),
        ("java", "java"),
        ("jl", "julia"),
        ("js", "javascript"),
        ("json", "json"),
        ("jsx", "jsx"),
        ("kt", "kotlin"),
        ("kts", "kotlin"),
        ("less", "less"),
        ("lua", "lua"),
        ("md", "markdown"),
        ("mdx", "markdown"),
        ("mjs", "javascript"),
        ("ml", "ocaml"),
        ("php", "php"),
        ("pl", "perl"),
        ("proto", "protobuf"),
        ("ps1", "powershell"),
        ("py", "python"),
        ("pyi", "python"),
        ("r", "r"),
        ("rb", "ruby"),
        ("rs", "rust"),
        ("sass", "sass"),
        ("scala", "scala"),
        ("scss", "scss"),
        ("sh", "bash"),
        ("sol", "solidity"),
        ("sql", "sql"),
        ("svelte", "svelte"),
        ("swift", "swift"),
        ("tex", "latex"),
        ("tf", "hcl"),
        ("toml", "toml"),
        ("ts", "typescript"),
        ("tsx", "tsx"),
        ("txt", "text"),
        ("vue", "vue"),
        ("xml", "xml"),
        ("yaml", "yaml"),
        ("yml", "yaml"),
        ("zig", "zig"),
        ("zsh", "bash"),
    ])
});

/// Lowercased extension of the final path segment, if it has one.
///
/// Dot-files such as `.gitignore` have no extension.
pub fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}

/// Fence tag for a file path. Unknown extensions pass through lowercased; paths
/// without an extension produce an empty tag.
pub fn language_tag(path: &str) -> String {
    match extension(path) {
        Some(ext) => LANGUAGE_TAGS
            .get(ext.as_str())
            .map(|tag| tag.to_string())
            .unwrap_or(ext),
        None => String::new(),
    }
}
