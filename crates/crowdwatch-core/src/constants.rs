//! Default values for every tunable in the trust pipeline.
//!
//! Nothing in the pipeline reads these directly; they seed the
//! `Default` implementations of the component configs so that an empty
//! configuration file reproduces production behaviour.

// --- Rate limiting ---

/// Submissions allowed per user within one window.
pub const RATE_LIMIT_REPORTS_PER_MIN: u32 = 5;
/// Length of the submission counting window.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;
/// Storage key prefix for submission counters.
pub const RATE_LIMIT_KEY_PREFIX: &str = "rate_limit:community_report:";

// --- Content filter ---

/// Characters that mark text as written in the supported language.
pub const LANGUAGE_ALPHABET: &str = "ăâêôơưđ";
pub const MIN_REPORT_LENGTH: usize = 20;
pub const MAX_REPORT_LENGTH: usize = 2000;
pub const MIN_WORDS_FOR_REPORT: usize = 5;
pub const MAX_ALLOWED_LINKS: usize = 2;
/// Text shorter than this is never checked for shouting.
pub const MIN_LENGTH_FOR_UPPER_CHECK: usize = 20;
pub const MAX_UPPERCASE_RATIO: f64 = 0.5;

/// Commercial solicitation markers. Matched case-insensitively.
pub const SPAM_PATTERNS: &[&str] = &[
    r"spam",
    r"bán\s*hàng",
    r"khuyến\s*mãi",
    r"mua\s*ngay",
    r"giảm\s*giá",
    r"tặng\s*quà",
    r"liên\s*hệ",
    r"inbox",
    r"số\s*điện\s*thoại",
    r"zalo",
    r"facebook",
];

/// Profanity list. Word-bounded so that ordinary words containing a short
/// entry ("nguy hiểm" vs "ngu") are not rejected.
pub const OFFENSIVE_PATTERNS: &[&str] = &[
    r"\bđịt\b",
    r"\bcặc\b",
    r"\blồn\b",
    r"\bđéo\b",
    r"\bmẹ\s*mày\b",
    r"\bvcl\b",
    r"\bđm\b",
    r"\bdm\b",
    r"\bshit\b",
    r"\bfuck\b",
    r"\bbitch\b",
    r"\bđồ\s*ngu\b",
    r"\bđồ\s*chó\b",
    r"\bkhốn\s*nạn\b",
    r"\bmẹ\s*kiếp\b",
    r"\bbố\s*láo\b",
    r"\brác\s*rưởi\b",
];

pub const PHONE_PATTERN: &str =
    r"(?:0|\+84)(?:[\s\-\.]?\d{2,3}[\s\-\.]?\d{3}[\s\-\.]?\d{3,4}|\d{9,10})";
pub const URL_PATTERN: &str = r"https?://[^\s]+|www\.[^\s]+";

pub const DATE_PATTERNS: &[&str] = &[r"hôm\s*(?:nay|qua)", r"\d{1,2}/\d{1,2}(?:/\d{2,4})?"];
pub const TIME_PATTERNS: &[&str] = &[r"\d{1,2}(?::|h)\d{0,2}"];
pub const LOCATION_PATTERNS: &[&str] = &[
    r"ngã\s*tư\s*\S+(?:\s+\S+)?",
    r"quận\s*\S+(?:\s+\S+)?",
    r"đường\s*\S+(?:\s+\S+)?",
    r"cầu\s*\S+(?:\s+\S+)?",
];

// --- Reputation ---

pub const DEFAULT_REPUTATION: f64 = 0.5;
pub const REPUTATION_LEARNING_RATE: f64 = 0.1;

// --- Credibility ---

pub const REPUTATION_WEIGHT_W1: f64 = 0.4;
pub const AGREE_VOTE_WEIGHT_W2: f64 = 0.4;
pub const DISAGREE_VOTE_WEIGHT_W3: f64 = -0.2;
pub const SIGMOID_K: f64 = 0.1;
pub const MIN_VOTES_THRESHOLD: u32 = 3;
pub const CREDIBILITY_THRESHOLD_HIGH: f64 = 0.9;
pub const CREDIBILITY_THRESHOLD_MEDIUM: f64 = 0.7;
pub const CREDIBILITY_THRESHOLD_LOW_REMOVE: f64 = 0.3;
pub const DAYS_THRESHOLD_LOW_REMOVE: u32 = 7;
pub const CREDIBILITY_THRESHOLD_MEDIUM_REMOVE: f64 = 0.5;
pub const DAYS_THRESHOLD_MEDIUM_REMOVE: u32 = 14;

// --- Rewards and penalties ---

/// Score at or above which a post counts toward rewards.
pub const HIGH_CREDIBILITY_THRESHOLD: f64 = 0.9;
pub const MIN_POSTS_FOR_REWARD: u32 = 10;
pub const MIN_TOTAL_UPVOTES: u64 = 50;
pub const REWARD_PER_HIGH_CREDIBILITY_POST: u64 = 1000;

/// Score below which a post counts toward penalties.
pub const LOW_CREDIBILITY_THRESHOLD_PENALTY: f64 = 0.3;
pub const BAN_LEVEL_1_THRESHOLD: u32 = 3;
pub const BAN_LEVEL_2_THRESHOLD: u32 = 5;
pub const BAN_LEVEL_3_THRESHOLD: u32 = 10;
pub const BAN_LEVEL_2_DAYS: u32 = 30;

/// Ban length in days per fake-alarm count (index 0 = first offence).
/// `-1` is a permanent ban.
pub const FAKE_ALARM_BAN_DAYS: [i64; 3] = [90, 180, -1];

// --- Duplicate detection ---

pub const COSINE_SIMILARITY_THRESHOLD_DUPLICATE: f64 = 0.85;
pub const COSINE_SIMILARITY_THRESHOLD_REFERENCE: f64 = 0.70;
/// Half-width of the bounding box, in degrees (~2 km).
pub const GEO_TOLERANCE_DEG: f64 = 0.02;

// --- Lifecycle ---

pub const REPORT_EXPIRE_SECS_FOR_UNVERIFIED: u64 = 7 * 24 * 3600;
pub const COLLABORATOR_TIMEOUT_SECS: u64 = 5;
pub const SECS_PER_DAY: i64 = 86_400;
