use std::fmt;

/// Error produced when a mode spec cannot be parsed or applied.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ModeError {
    /// The spec contained a clause without any permission letters.
    #[error("mode clause '{0}' has no permissions after the operator")]
    EmptyPermissions(String),
    /// The spec contained an unexpected character.
    #[error("unexpected character '{ch}' in mode spec '{spec}'")]
    UnexpectedCharacter {
        /// The offending character.
        ch: char,
        /// The full spec being parsed.
        spec: String,
    },
    /// A clause was missing its `+`/`-`/`=` operator.
    #[error("mode clause '{0}' is missing an operator (+, - or =)")]
    MissingOperator(String),
    /// An octal mode spec did not parse as an octal number.
    #[error("'{0}' is not a valid octal mode")]
    InvalidOctal(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Operation {
    Add,
    Remove,
    Assign,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct WhoMask {
    user: bool,
    group: bool,
    other: bool,
}

impl WhoMask {
    const fn all() -> Self {
        Self {
            user: true,
            group: true,
            other: true,
        }
    }

    const fn none() -> Self {
        Self {
            user: false,
            group: false,
            other: false,
        }
    }

    const fn is_empty(self) -> bool {
        !self.user && !self.group && !self.other
    }

    /// rwx bit positions covered by this mask.
    fn perm_bits(self, perm: u32) -> u32 {
        let mut bits = 0;
        if self.user {
            bits |= perm << 6;
        }
        if self.group {
            bits |= perm << 3;
        }
        if self.other {
            bits |= perm;
        }
        bits
    }

    /// Special bits (setuid/setgid/sticky) cleared by an `=` assignment for
    /// this mask.
    const fn special_bits(self) -> u32 {
        let mut bits = 0;
        if self.user {
            bits |= 0o4000;
        }
        if self.group {
            bits |= 0o2000;
        }
        if self.other {
            bits |= 0o1000;
        }
        bits
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct PermSpec {
    read: bool,
    write: bool,
    exec: bool,
    exec_if_conditional: bool,
    setid: bool,
    sticky: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Clause {
    who: WhoMask,
    op: Operation,
    perms: PermSpec,
}

impl Clause {
    fn bits(&self, current: u32, is_dir: bool) -> u32 {
        let mut perm = 0;
        if self.perms.read {
            perm |= 0o4;
        }
        if self.perms.write {
            perm |= 0o2;
        }
        if self.perms.exec
            || (self.perms.exec_if_conditional && (is_dir || current & 0o111 != 0))
        {
            perm |= 0o1;
        }
        let mut bits = self.who.perm_bits(perm);
        if self.perms.setid {
            if self.who.user {
                bits |= 0o4000;
            }
            if self.who.group {
                bits |= 0o2000;
            }
        }
        if self.perms.sticky {
            bits |= 0o1000;
        }
        bits
    }

    fn apply(&self, current: u32, is_dir: bool) -> u32 {
        let bits = self.bits(current, is_dir);
        match self.op {
            Operation::Add => current | bits,
            Operation::Remove => current & !bits,
            Operation::Assign => {
                let cleared = current & !(self.who.perm_bits(0o7) | self.who.special_bits());
                cleared | bits
            }
        }
    }
}

/// A parsed symbolic mode spec such as `u+rw,go=rX,a-s`.
///
/// Clause syntax follows `chmod(1)`: an optional `ugoa` who-list (defaults
/// to `a`), one of `+`/`-`/`=`, and permission letters `rwxXst`. `X` grants
/// execute only to directories and to files that already have an execute
/// bit set, which is what Debian's permission normalization relies on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolicMode {
    spec: String,
    clauses: Vec<Clause>,
}

impl SymbolicMode {
    /// Parses a symbolic mode spec.
    ///
    /// # Errors
    ///
    /// Returns [`ModeError`] if the spec is not valid `chmod` symbolic
    /// syntax.
    pub fn parse(spec: &str) -> Result<Self, ModeError> {
        let mut clauses = Vec::new();
        for part in spec.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            clauses.push(parse_clause(trimmed, spec)?);
        }
        Ok(Self {
            spec: spec.to_owned(),
            clauses,
        })
    }

    /// Applies every clause, in order, to `current`.
    #[must_use]
    pub fn compute_mode(&self, current: u32, is_dir: bool) -> u32 {
        self.clauses
            .iter()
            .fold(current, |mode, clause| clause.apply(mode, is_dir))
    }

    /// Returns the spec as originally written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.spec
    }
}

fn parse_clause(text: &str, spec: &str) -> Result<Clause, ModeError> {
    let mut chars = text.chars().peekable();
    let mut who = WhoMask::none();
    let mut consumed_who = false;

    loop {
        match chars.peek().copied() {
            Some('u') => {
                who.user = true;
                consumed_who = true;
                chars.next();
            }
            Some('g') => {
                who.group = true;
                consumed_who = true;
                chars.next();
            }
            Some('o') => {
                who.other = true;
                consumed_who = true;
                chars.next();
            }
            Some('a') => {
                who = WhoMask::all();
                consumed_who = true;
                chars.next();
            }
            _ => break,
        }
    }
    if !consumed_who || who.is_empty() {
        who = WhoMask::all();
    }

    let op = match chars.next() {
        Some('+') => Operation::Add,
        Some('-') => Operation::Remove,
        Some('=') => Operation::Assign,
        _ => return Err(ModeError::MissingOperator(text.to_owned())),
    };

    let mut perms = PermSpec::default();
    let mut saw_perm = false;
    for ch in chars {
        saw_perm = true;
        match ch {
            'r' => perms.read = true,
            'w' => perms.write = true,
            'x' => perms.exec = true,
            'X' => perms.exec_if_conditional = true,
            's' => perms.setid = true,
            't' => perms.sticky = true,
            other => {
                return Err(ModeError::UnexpectedCharacter {
                    ch: other,
                    spec: spec.to_owned(),
                });
            }
        }
    }
    // `go=` (assign nothing) is valid chmod; it clears the covered bits.
    if !saw_perm && op != Operation::Assign {
        return Err(ModeError::EmptyPermissions(text.to_owned()));
    }

    Ok(Clause { who, op, perms })
}

/// A mode requested for a path: either a fixed octal value or a symbolic
/// spec resolved against the path's current mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileSystemMode {
    /// A fixed octal mode such as `0o644`.
    Octal(u32),
    /// A symbolic spec such as `u+rw,go=rX`.
    Symbolic(SymbolicMode),
}

impl FileSystemMode {
    /// Parses either an octal literal (`0644`) or a symbolic spec.
    pub fn parse(spec: &str) -> Result<Self, ModeError> {
        if spec.chars().all(|c| c.is_ascii_digit()) && !spec.is_empty() {
            let value = u32::from_str_radix(spec, 8)
                .map_err(|_| ModeError::InvalidOctal(spec.to_owned()))?;
            if value > 0o7777 {
                return Err(ModeError::InvalidOctal(spec.to_owned()));
            }
            return Ok(Self::Octal(value));
        }
        SymbolicMode::parse(spec).map(Self::Symbolic)
    }

    /// Parses a symbolic spec, rejecting octal literals.
    pub fn symbolic(spec: &str) -> Result<Self, ModeError> {
        SymbolicMode::parse(spec).map(Self::Symbolic)
    }

    /// Resolves the requested mode against `current`.
    #[must_use]
    pub fn compute_mode(&self, current: u32, is_dir: bool) -> u32 {
        match self {
            Self::Octal(mode) => *mode,
            Self::Symbolic(sym) => sym.compute_mode(current, is_dir),
        }
    }
}

impl fmt::Display for FileSystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Octal(mode) => write!(f, "{mode:04o}"),
            Self::Symbolic(sym) => f.write_str(sym.as_str()),
        }
    }
}
