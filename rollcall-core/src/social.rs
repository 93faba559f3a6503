// Social network handles -> canonical profile URL columns

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linkedin,
    Facebook,
    Instagram,
    Twitter,
    Skype,
    Telegram,
    Youtube,
    Tiktok,
    Github,
    Discord,
    Whatsapp,
    Snapchat,
    Pinterest,
    Reddit,
    Tumblr,
    Medium,
    Behance,
    Dribbble,
}

impl Platform {
    pub const ALL: [Platform; 18] = [
        Platform::Linkedin,
        Platform::Facebook,
        Platform::Instagram,
        Platform::Twitter,
        Platform::Skype,
        Platform::Telegram,
        Platform::Youtube,
        Platform::Tiktok,
        Platform::Github,
        Platform::Discord,
        Platform::Whatsapp,
        Platform::Snapchat,
        Platform::Pinterest,
        Platform::Reddit,
        Platform::Tumblr,
        Platform::Medium,
        Platform::Behance,
        Platform::Dribbble,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linkedin => "linkedin",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Twitter => "twitter",
            Platform::Skype => "skype",
            Platform::Telegram => "telegram",
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
            Platform::Github => "github",
            Platform::Discord => "discord",
            Platform::Whatsapp => "whatsapp",
            Platform::Snapchat => "snapchat",
            Platform::Pinterest => "pinterest",
            Platform::Reddit => "reddit",
            Platform::Tumblr => "tumblr",
            Platform::Medium => "medium",
            Platform::Behance => "behance",
            Platform::Dribbble => "dribbble",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let lowered = s.to_lowercase();
        Platform::ALL.into_iter().find(|p| p.as_str() == lowered)
    }

    pub fn column(&self) -> &'static str {
        match self {
            Platform::Linkedin => "linkedinUrl",
            Platform::Facebook => "facebookUrl",
            Platform::Instagram => "instagramUrl",
            Platform::Twitter => "twitterUrl",
            Platform::Skype => "skypeUrl",
            Platform::Telegram => "telegramUrl",
            Platform::Youtube => "youtubeUrl",
            Platform::Tiktok => "tiktokUrl",
            Platform::Github => "githubUrl",
            Platform::Discord => "discordUrl",
            Platform::Whatsapp => "whatsappUrl",
            Platform::Snapchat => "snapchatUrl",
            Platform::Pinterest => "pinterestUrl",
            Platform::Reddit => "redditUrl",
            Platform::Tumblr => "tumblrUrl",
            Platform::Medium => "mediumUrl",
            Platform::Behance => "behanceUrl",
            Platform::Dribbble => "dribbbleUrl",
        }
    }

    pub fn profile_url(&self, profile: &str) -> String {
        match self {
            Platform::Linkedin => format!("https://linkedin.com/in/{}", profile),
            Platform::Facebook => format!("https://facebook.com/{}", profile),
            Platform::Instagram => format!("https://instagram.com/{}", profile),
            Platform::Twitter => format!("https://twitter.com/{}", profile),
            Platform::Skype => format!("skype:{}?chat", profile),
            Platform::Telegram => format!("https://t.me/{}", profile),
            Platform::Youtube => format!("https://youtube.com/@{}", profile),
            Platform::Tiktok => format!("https://tiktok.com/@{}", profile),
            Platform::Github => format!("https://github.com/{}", profile),
            Platform::Discord => format!("discord:{}", profile),
            Platform::Whatsapp => format!("https://wa.me/{}", profile),
            Platform::Snapchat => format!("https://snapchat.com/add/{}", profile),
            Platform::Pinterest => format!("https://pinterest.com/{}", profile),
            Platform::Reddit => format!("https://reddit.com/u/{}", profile),
            Platform::Tumblr => format!("https://{}.tumblr.com", profile),
            Platform::Medium => format!("https://medium.com/@{}", profile),
            Platform::Behance => format!("https://behance.net/{}", profile),
            Platform::Dribbble => format!("https://dribbble.com/{}", profile),
        }
    }
}

/// A network tag as it appears in a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Network {
    Known(Platform),
    /// Lowercased tag of a platform without a URL template.
    Unknown(String),
}

impl Network {
    pub fn parse(tag: &str) -> Self {
        match Platform::from_str(tag) {
            Some(platform) => Network::Known(platform),
            None => Network::Unknown(tag.to_lowercase()),
        }
    }

    pub fn column(&self) -> String {
        match self {
            Network::Known(platform) => platform.column().to_string(),
            Network::Unknown(tag) => format!("{}Url", tag),
        }
    }

    /// Known platforms get a templated URL; unknown ones keep the raw handle.
    pub fn render(&self, profile: &str) -> String {
        match self {
            Network::Known(platform) => platform.profile_url(profile),
            Network::Unknown(_) => profile.to_string(),
        }
    }
}

/// Resolve `{type, profile}` entries into URL columns. Every known platform
/// column is present in the output, null unless the input supplied it.
pub fn resolve_social_links(networks: &[Value]) -> Map<String, Value> {
    let mut columns = Map::new();
    for platform in Platform::ALL {
        columns.insert(platform.column().to_string(), Value::Null);
    }

    for entry in networks {
        let Some(tag) = entry.get("type").and_then(Value::as_str).filter(|t| !t.is_empty()) else {
            continue;
        };
        let Some(profile) = profile_text(entry.get("profile")) else {
            continue;
        };

        let network = Network::parse(tag);
        columns.insert(network.column(), Value::String(network.render(&profile)));
    }

    columns
}

fn profile_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
