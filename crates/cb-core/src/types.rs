//! Core type definitions for ContentBlocker
//!
//! These types are shared by the parser, the index builder and the
//! matching engine.

// =============================================================================
// Rule Kind
// =============================================================================

/// Whether a network rule blocks or excepts a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RuleKind {
    /// Block rule - cancels the request
    Block = 0,
    /// Exception rule (@@...) - allows the request
    Exception = 1,
}

// =============================================================================
// Rule Flags
// =============================================================================

bitflags::bitflags! {
    /// Flags for rule behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RuleFlags: u16 {
        /// Pattern is a regex (`/.../`)
        const IS_REGEX = 1 << 0;
        /// Case-sensitive matching ($match-case)
        const MATCH_CASE = 1 << 1;
        /// Rule has left anchor (starts with |)
        const HAS_LEFT_ANCHOR = 1 << 2;
        /// Rule has hostname anchor (||)
        const HAS_HOST_ANCHOR = 1 << 3;
        /// Rule has right anchor (ends with |)
        const HAS_RIGHT_ANCHOR = 1 << 4;
        /// User-added rule (Custom Rules profile)
        const IS_USER_RULE = 1 << 5;
    }
}

// =============================================================================
// Request Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Request type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestType: u16 {
        const MAIN_FRAME = 1 << 0;
        const SUB_FRAME = 1 << 1;  // iframe/frame
        const POPUP = 1 << 2;
        const STYLESHEET = 1 << 3;
        const SCRIPT = 1 << 4;
        const IMAGE = 1 << 5;
        const OBJECT = 1 << 6;
        const OBJECT_SUBREQUEST = 1 << 7;
        const XMLHTTPREQUEST = 1 << 8;
        const WEBSOCKET = 1 << 9;
        const OTHER = 1 << 10;

        /// All request types
        const ALL = (1 << 11) - 1;
        /// Types a rule applies to when it names none: pop-ups are opt-in
        const DEFAULT = Self::ALL.bits() & !Self::POPUP.bits();
    }
}

impl RequestType {
    /// Look up a type by name. Accepts the filter-list option names, their
    /// common aliases and the browser's resource type names.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let ty = match name {
            "main_frame" | "document" => Self::MAIN_FRAME,
            "sub_frame" | "subdocument" | "frame" => Self::SUB_FRAME,
            "popup" => Self::POPUP,
            "stylesheet" | "css" => Self::STYLESHEET,
            "script" => Self::SCRIPT,
            "image" => Self::IMAGE,
            "object" => Self::OBJECT,
            "object_subrequest" | "object-subrequest" => Self::OBJECT_SUBREQUEST,
            "xmlhttprequest" | "xhr" => Self::XMLHTTPREQUEST,
            "websocket" => Self::WEBSOCKET,
            "other" => Self::OTHER,
            _ => return None,
        };
        Some(ty)
    }

    /// Type of a browser request. Unknown names are `OTHER`.
    pub fn from_str(s: &str) -> Self {
        Self::from_type_name(s).unwrap_or(Self::OTHER)
    }
}

// =============================================================================
// Third-party constraint
// =============================================================================

/// `$third-party` / `$~third-party` restriction of a network rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThirdPartyConstraint {
    #[default]
    Any,
    OnlyThirdParty,
    OnlyFirstParty,
}

impl ThirdPartyConstraint {
    #[inline]
    pub fn allows(self, is_third_party: bool) -> bool {
        match self {
            Self::Any => true,
            Self::OnlyThirdParty => is_third_party,
            Self::OnlyFirstParty => !is_third_party,
        }
    }
}

// =============================================================================
// Request
// =============================================================================

/// Candidate request as handed over by the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Full request URL
    pub url: String,
    /// URL of the document that initiated the request
    pub document_url: String,
    /// Request type
    pub resource_type: RequestType,
}

impl Request {
    pub fn new(url: impl Into<String>, document_url: impl Into<String>, resource_type: RequestType) -> Self {
        Self {
            url: url.into(),
            document_url: document_url.into(),
            resource_type,
        }
    }
}

/// Context for a request being matched.
///
/// Everything the matcher needs is derived once per request so the
/// per-rule checks are plain comparisons.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Lowercased request URL (case-insensitive patterns match against this)
    pub url_lower: String,
    /// Request hostname (lowercase)
    pub req_host: String,
    /// Request eTLD+1
    pub req_etld1: String,
    /// Document hostname (lowercase)
    pub site_host: String,
    /// Document eTLD+1
    pub site_etld1: String,
    /// Is this a third-party request?
    pub is_third_party: bool,
    /// Request type
    pub request_type: RequestType,
    /// Hashed tokens of `url_lower`, for the token buckets
    pub tokens: Vec<u32>,
}

// =============================================================================
// Match Decision
// =============================================================================

/// The rule responsible for a decision, for reporting only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRule {
    /// Identifier of the profile the rule came from
    pub profile_id: String,
    /// Raw rule text as written in the list
    pub rule_text: String,
}

/// Final decision for a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchDecision {
    pub is_blocked: bool,
    /// Rule that blocked the request, or the exception that saved it
    pub matched_rule: Option<MatchedRule>,
}

impl MatchDecision {
    pub fn allow() -> Self {
        Self::default()
    }

    pub fn blocked_by(profile_id: &str, rule_text: &str) -> Self {
        Self {
            is_blocked: true,
            matched_rule: Some(MatchedRule {
                profile_id: profile_id.to_string(),
                rule_text: rule_text.to_string(),
            }),
        }
    }

    pub fn excepted_by(profile_id: &str, rule_text: &str) -> Self {
        Self {
            is_blocked: false,
            matched_rule: Some(MatchedRule {
                profile_id: profile_id.to_string(),
                rule_text: rule_text.to_string(),
            }),
        }
    }
}
