use std::{fs, path::Path};

use serde::Deserialize;

use crate::domain::error::DomainError;

const DEFAULT_SYSTEM_PROMPT: &str = "\
Sen \"Arıcılık Asistanı\" adında, yalnızca arıcılık konularında yardım eden bir asistansın. \
Kovan yönetimi, ana arı, oğul kontrolü, varroa ve diğer hastalıklar, besleme, bal hasadı ve \
mevsimsel bakım hakkında kısa, net ve uygulanabilir cevaplar ver. Cevapların WhatsApp mesajına \
sığacak kadar kısa olsun ve gerekirse adım adım yaz. İlaç, asit veya duman gibi riskli \
uygulamalarda güvenlik uyarısı ekle ve etiket talimatlarına uyulmasını hatırlat. \
Arıcılık dışındaki soruları kibarca reddet ve kullanıcıyı arıcılıkla ilgili bir soru sormaya davet et.";

const DEFAULT_OFF_TOPIC_NOTICE: &str = "\
Ben yalnızca arıcılıkla ilgili sorulara yardımcı olabiliyorum. \
Kovan, ana arı, varroa, besleme veya bal hasadı hakkında bir soru sorabilirsin.";

const DEFAULT_LIMIT_NOTICE: &str = "\
Bugünkü {limit} soruluk hakkını doldurdun. Yarın yeniden yardımcı olmaktan memnuniyet duyarım.";

const DEFAULT_FALLBACK_REPLY: &str = "\
Şu anda cevap üretemiyorum, lütfen biraz sonra tekrar dene.";

/// Matched as substrings after normalization; none may occur inside an
/// everyday word (`arı` in `yarın`, `bee` in `been`).
const DEFAULT_KEYWORDS: &[&str] = &[
    "arıcı",
    "arılar",
    "bal arı",
    "ana arı",
    "kraliçe arı",
    "bal hasad",
    "bal süz",
    "balmumu",
    "bal mumu",
    "kovan",
    "petek",
    "oğul ver",
    "oğul tut",
    "varroa",
    "propolis",
    "polen",
    "nektar",
    "kuluçka",
    "arı sütü",
    "beekeep",
    "beehive",
    "bees",
    "honeybee",
    "honey bee",
    "honeycomb",
    "honey harvest",
    "apiary",
    "apiarist",
    "apicultur",
    "swarm",
    "queen bee",
    "queen cell",
    "nectar",
    "brood",
];

/// Persona, topic terms and canned texts for one assistant deployment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssistantProfile {
    pub system_prompt: String,
    pub keywords: Vec<String>,
    pub off_topic_notice: String,
    /// `{limit}` is replaced with the configured daily limit.
    pub limit_notice: String,
    pub fallback_reply: String,
}

impl Default for AssistantProfile {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            keywords: DEFAULT_KEYWORDS
                .iter()
                .map(|keyword| (*keyword).to_owned())
                .collect(),
            off_topic_notice: DEFAULT_OFF_TOPIC_NOTICE.to_owned(),
            limit_notice: DEFAULT_LIMIT_NOTICE.to_owned(),
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_owned(),
        }
    }
}

impl AssistantProfile {
    pub fn load(path: &Path) -> Result<Self, DomainError> {
        let raw = fs::read_to_string(path).map_err(|error| {
            DomainError::InvalidConfig(format!(
                "failed to read profile {}: {error}",
                path.display()
            ))
        })?;
        Self::from_toml(&raw).map_err(|error| {
            DomainError::InvalidConfig(format!("invalid profile {}: {error}", path.display()))
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, String> {
        let profile: Self = toml::from_str(raw).map_err(|error| error.to_string())?;
        profile.validate()?;
        Ok(profile)
    }

    #[must_use]
    pub fn limit_notice_for(&self, daily_limit: u32) -> String {
        self.limit_notice.replace("{limit}", &daily_limit.to_string())
    }

    fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("system_prompt", &self.system_prompt),
            ("off_topic_notice", &self.off_topic_notice),
            ("limit_notice", &self.limit_notice),
            ("fallback_reply", &self.fallback_reply),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} must not be empty"));
            }
        }
        Ok(())
    }
}
