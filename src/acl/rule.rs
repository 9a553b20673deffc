// The ACL rule mini-language: textual rules parsed into tagged variants

use bytes::Bytes;

use super::AclError;

/// Patterns longer than this are rejected, bounding the matcher's worst case.
pub const MAX_PATTERN_LEN: usize = 256;

/// Named command groups usable in `+@<cat>` / `-@<cat>` rules. Membership is
/// carried by the command descriptors, not by the ACL core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Set,
    SortedSet,
    List,
    Hash,
    String,
    Bitmap,
    Hyperloglog,
    Stream,
    Admin,
    Readonly,
    Readwrite,
    Fast,
    Slow,
    Pubsub,
    All,
}

impl Category {
    pub const ALL_NAMES: [&'static str; 15] = [
        "set",
        "sortedset",
        "list",
        "hash",
        "string",
        "bitmap",
        "hyperloglog",
        "stream",
        "admin",
        "readonly",
        "readwrite",
        "fast",
        "slow",
        "pubsub",
        "all",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Set => "set",
            Category::SortedSet => "sortedset",
            Category::List => "list",
            Category::Hash => "hash",
            Category::String => "string",
            Category::Bitmap => "bitmap",
            Category::Hyperloglog => "hyperloglog",
            Category::Stream => "stream",
            Category::Admin => "admin",
            Category::Readonly => "readonly",
            Category::Readwrite => "readwrite",
            Category::Fast => "fast",
            Category::Slow => "slow",
            Category::Pubsub => "pubsub",
            Category::All => "all",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "set" => Some(Category::Set),
            "sortedset" => Some(Category::SortedSet),
            "list" => Some(Category::List),
            "hash" => Some(Category::Hash),
            "string" => Some(Category::String),
            "bitmap" => Some(Category::Bitmap),
            "hyperloglog" => Some(Category::Hyperloglog),
            "stream" => Some(Category::Stream),
            "admin" => Some(Category::Admin),
            "readonly" => Some(Category::Readonly),
            "readwrite" => Some(Category::Readwrite),
            "fast" => Some(Category::Fast),
            "slow" => Some(Category::Slow),
            "pubsub" => Some(Category::Pubsub),
            "all" => Some(Category::All),
            _ => None,
        }
    }
}

/// One parsed rule of the user mutation language. Parsing, persistence and
/// application are separate phases over this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclRule {
    /// `on`
    Enable,
    /// `off`
    Disable,
    /// `allkeys` or `~*`
    AllKeys,
    /// `resetkeys`
    ResetKeys,
    /// `~<pattern>`
    AddPattern(Bytes),
    /// `allcommands` or `+@all`
    AllCommands,
    /// `+<command>`
    AddCommand(String),
    /// `+<command>|<subcommand>`
    AddSubcommand(String, String),
    /// `-<command>`
    RemoveCommand(String),
    /// `+@<category>` (other than `@all`)
    AddCategory(Category),
    /// `-@<category>`
    RemoveCategory(Category),
    /// `nopass`
    NoPass,
    /// `><password>`
    AddPassword(Bytes),
    /// `<<password>`
    RemovePassword(Bytes),
    /// `resetpass`
    ResetPass,
    /// `reset`
    Reset,
}

impl AclRule {
    /// Parse a single rule. Keywords are matched case-insensitively; the
    /// payload after a `>`, `<` or `~` sigil is taken verbatim and may be
    /// binary. Anything unrecognised is a syntax error carrying the
    /// offending rule text.
    pub fn parse(op: &[u8]) -> Result<AclRule, AclError> {
        let syntax_error = || AclError::SyntaxError(String::from_utf8_lossy(op).into_owned());

        if eq_keyword(op, "on") {
            return Ok(AclRule::Enable);
        }
        if eq_keyword(op, "off") {
            return Ok(AclRule::Disable);
        }
        if eq_keyword(op, "allkeys") || op == b"~*" {
            return Ok(AclRule::AllKeys);
        }
        if eq_keyword(op, "resetkeys") {
            return Ok(AclRule::ResetKeys);
        }
        if eq_keyword(op, "allcommands") || eq_keyword(op, "+@all") {
            return Ok(AclRule::AllCommands);
        }
        if eq_keyword(op, "nopass") {
            return Ok(AclRule::NoPass);
        }
        if eq_keyword(op, "resetpass") {
            return Ok(AclRule::ResetPass);
        }
        if eq_keyword(op, "reset") {
            return Ok(AclRule::Reset);
        }

        match op.first() {
            Some(b'~') => {
                let pattern = &op[1..];
                if pattern.len() > MAX_PATTERN_LEN {
                    return Err(syntax_error());
                }
                Ok(AclRule::AddPattern(Bytes::copy_from_slice(pattern)))
            }
            Some(b'>') => Ok(AclRule::AddPassword(Bytes::copy_from_slice(&op[1..]))),
            Some(b'<') => Ok(AclRule::RemovePassword(Bytes::copy_from_slice(&op[1..]))),
            Some(b'+') | Some(b'-') => {
                let adding = op[0] == b'+';
                let body = std::str::from_utf8(&op[1..]).map_err(|_| syntax_error())?;
                if let Some(category) = body.strip_prefix('@') {
                    let category = Category::from_name(category).ok_or_else(syntax_error)?;
                    return Ok(if adding {
                        match category {
                            Category::All => AclRule::AllCommands,
                            _ => AclRule::AddCategory(category),
                        }
                    } else {
                        AclRule::RemoveCategory(category)
                    });
                }
                if let Some((command, subcommand)) = body.split_once('|') {
                    // Subcommand grants are additive only.
                    if !adding
                        || command.is_empty()
                        || subcommand.is_empty()
                        || subcommand.contains('|')
                    {
                        return Err(syntax_error());
                    }
                    return Ok(AclRule::AddSubcommand(
                        command.to_ascii_lowercase(),
                        subcommand.to_string(),
                    ));
                }
                if body.is_empty() {
                    return Err(syntax_error());
                }
                let command = body.to_ascii_lowercase();
                Ok(if adding {
                    AclRule::AddCommand(command)
                } else {
                    AclRule::RemoveCommand(command)
                })
            }
            _ => Err(syntax_error()),
        }
    }

    /// The textual form that [`AclRule::parse`] accepts back; used for
    /// `ACL LIST` and the ACL file.
    pub fn serialize(&self) -> String {
        match self {
            AclRule::Enable => "on".to_string(),
            AclRule::Disable => "off".to_string(),
            AclRule::AllKeys => "~*".to_string(),
            AclRule::ResetKeys => "resetkeys".to_string(),
            AclRule::AddPattern(p) => format!("~{}", String::from_utf8_lossy(p)),
            AclRule::AllCommands => "+@all".to_string(),
            AclRule::AddCommand(c) => format!("+{}", c),
            AclRule::AddSubcommand(c, s) => format!("+{}|{}", c, s),
            AclRule::RemoveCommand(c) => format!("-{}", c),
            AclRule::AddCategory(c) => format!("+@{}", c.name()),
            AclRule::RemoveCategory(c) => format!("-@{}", c.name()),
            AclRule::NoPass => "nopass".to_string(),
            AclRule::AddPassword(p) => format!(">{}", String::from_utf8_lossy(p)),
            AclRule::RemovePassword(p) => format!("<{}", String::from_utf8_lossy(p)),
            AclRule::ResetPass => "resetpass".to_string(),
            AclRule::Reset => "reset".to_string(),
        }
    }
}

fn eq_keyword(op: &[u8], keyword: &str) -> bool {
    op.eq_ignore_ascii_case(keyword.as_bytes())
}
