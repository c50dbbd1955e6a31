use serde::Serialize;

/// How the dispatcher classifies a failure: recoverable faults are
/// recorded and the caller keeps feeding directives, fatal ones unwind
/// the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Severity {
    Recoverable,
    Fatal,
}

/// Every failure the compiler can signal, with the insert values the
/// message formatter needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SdlError {
    Syntax {
        token: String,
    },
    Parse {
        detail: String,
    },
    /// The identifier on an `END` does not match the opening.
    MatchEndName {
        expected: String,
        found: String,
    },
    /// Aggregate closed with no members.
    NullStructure {
        name: String,
    },
    /// Pointer subtype referring to an aggregate without a based name.
    AddressObjectNotBased {
        name: String,
    },
    /// Bitfield declared with a non-positive length.
    ZeroLength {
        name: String,
    },
    /// A bitfield run that no host integer can contain.
    BitfieldTooWide {
        name: String,
        bits: u32,
    },
    /// `CHARACTER *` outside an entry parameter.
    InvalidUnknownLength {
        name: String,
    },
    SymbolNotDefined {
        name: String,
    },
    InvalidConditionalState {
        directive: &'static str,
    },
    /// Duplicate id within one namespace.
    DuplicateId {
        name: String,
    },
    DuplicateLanguage {
        name: String,
    },
    DuplicateListingQualifier,
    InvalidQualifier {
        qualifier: String,
    },
    InvalidAlignment {
        value: u32,
    },
    NoOutput,
    NoInputFile,
    InputFileOpen {
        path: String,
        detail: String,
    },
    OutputFileOpen {
        path: String,
        detail: String,
    },
    NoCopyFile {
        path: String,
    },
    /// Directive arrived in a state that cannot accept it.
    InvalidState {
        directive: &'static str,
    },
    /// Internal invariant violation or resource exhaustion.
    Abort {
        detail: String,
    },
    /// Cascaded fatal from any of the above.
    ErrorExit,
}

impl SdlError {
    pub fn severity(&self) -> Severity {
        use SdlError::*;
        match self {
            NoInputFile | InputFileOpen { .. } | OutputFileOpen { .. }
            | NoOutput | Abort { .. } | ErrorExit => Severity::Fatal,
            Syntax { .. } | Parse { .. } | MatchEndName { .. }
            | NullStructure { .. } | AddressObjectNotBased { .. }
            | ZeroLength { .. } | BitfieldTooWide { .. }
            | InvalidUnknownLength { .. } | SymbolNotDefined { .. }
            | InvalidConditionalState { .. } | DuplicateId { .. }
            | DuplicateLanguage { .. } | DuplicateListingQualifier
            | InvalidQualifier { .. } | InvalidAlignment { .. }
            | NoCopyFile { .. } | InvalidState { .. } => {
                Severity::Recoverable
            }
        }
    }

    /// Stable short code used in rendered messages.
    pub fn code(&self) -> &'static str {
        use SdlError::*;
        match self {
            Syntax { .. } => "SYNTAX",
            Parse { .. } => "PARSE",
            MatchEndName { .. } => "MATCHEND",
            NullStructure { .. } => "NULLSTRUCT",
            AddressObjectNotBased { .. } => "NOTBASED",
            ZeroLength { .. } => "ZEROLEN",
            BitfieldTooWide { .. } => "BITFLDOVF",
            InvalidUnknownLength { .. } => "UNKLEN",
            SymbolNotDefined { .. } => "UNDEFSYM",
            InvalidConditionalState { .. } => "BADCOND",
            DuplicateId { .. } => "DUPID",
            DuplicateLanguage { .. } => "DUPLANG",
            DuplicateListingQualifier => "DUPLIST",
            InvalidQualifier { .. } => "BADQUAL",
            InvalidAlignment { .. } => "BADALIGN",
            NoOutput => "NOOUTPUT",
            NoInputFile => "NOINPUT",
            InputFileOpen { .. } => "INFILOPN",
            OutputFileOpen { .. } => "OUTFILOPN",
            NoCopyFile { .. } => "NOCOPY",
            InvalidState { .. } => "BADSTATE",
            Abort { .. } => "ABORT",
            ErrorExit => "ERREXIT",
        }
    }

    fn insert_text(&self) -> String {
        use SdlError::*;
        match self {
            Syntax { token } => format!("unexpected token \"{token}\""),
            Parse { detail } => detail.clone(),
            MatchEndName { expected, found } => {
                format!("END names \"{found}\", opening was \"{expected}\"")
            }
            NullStructure { name } => {
                format!("aggregate \"{name}\" has no members")
            }
            AddressObjectNotBased { name } => {
                format!("aggregate \"{name}\" is addressed but carries no BASED name")
            }
            ZeroLength { name } => {
                format!("bitfield \"{name}\" declared with non-positive length")
            }
            BitfieldTooWide { name, bits } => {
                format!("bitfield run at \"{name}\" needs {bits} bits, no host is wide enough")
            }
            InvalidUnknownLength { name } => {
                format!("\"{name}\": unknown length is only valid for entry parameters")
            }
            SymbolNotDefined { name } => {
                format!("conditional symbol \"{name}\" is not defined")
            }
            InvalidConditionalState { directive } => {
                format!("\"{directive}\" is not valid in the current conditional state")
            }
            DuplicateId { name } => {
                format!("\"{name}\" is already defined in this namespace")
            }
            DuplicateLanguage { name } => {
                format!("language \"{name}\" specified more than once")
            }
            DuplicateListingQualifier => {
                "both listing and no-listing were requested".to_string()
            }
            InvalidQualifier { qualifier } => {
                format!("unknown qualifier \"{qualifier}\"")
            }
            InvalidAlignment { value } => {
                format!("alignment {value} is not one of 0, 1, 2, 4, 8")
            }
            NoOutput => "no output language was selected".to_string(),
            NoInputFile => "no input file was supplied".to_string(),
            InputFileOpen { path, detail } => {
                format!("cannot open input \"{path}\": {detail}")
            }
            OutputFileOpen { path, detail } => {
                format!("cannot open output \"{path}\": {detail}")
            }
            NoCopyFile { path } => {
                format!("copyright file \"{path}\" not found")
            }
            InvalidState { directive } => {
                format!("\"{directive}\" arrived outside any accepting state")
            }
            Abort { detail } => detail.clone(),
            ErrorExit => "compilation terminated by previous errors".to_string(),
        }
    }
}

impl std::fmt::Display for SdlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = match self.severity() {
            Severity::Recoverable => 'E',
            Severity::Fatal => 'F',
        };
        write!(f, "%SDL-{letter}-{}, {}", self.code(), self.insert_text())
    }
}

impl std::error::Error for SdlError {}

/// A recorded failure: the error itself plus where it happened and the
/// aggregate names enclosing it at the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fault {
    pub error: SdlError,
    pub line: Option<u32>,
    pub aggregates: Vec<String>,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(line) = self.line {
            write!(f, " at line {line}")?;
        }
        for name in self.aggregates.iter().rev() {
            write!(f, "\n-SDL-I-AGGTRACE, in aggregate \"{name}\"")?;
        }
        Ok(())
    }
}
