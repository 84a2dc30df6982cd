//! User-facing messages in Traditional Chinese and English.
//!
//! Library code never formats user text itself. It asks a [`Translator`] for
//! a [`Message`], so embedders can plug in their own catalog.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Interface language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    /// Traditional Chinese.
    #[default]
    Zh,
    /// English.
    En,
}

impl Lang {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Zh => "zh",
            Self::En => "en",
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lang {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zh" | "zh-tw" | "zh-hk" | "zh-hant" => Ok(Self::Zh),
            "en" | "en-us" | "en-gb" => Ok(Self::En),
            other => Err(format!("Unsupported language: {other} (expected zh or en)")),
        }
    }
}

/// Messages shown around a backup or restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Asked before a restore overwrites existing data.
    ConfirmRestore,
    ExportSucceeded,
    ExportFailed,
    ImportSucceeded,
    ImportFailed,
    /// The backup file could not be read or parsed.
    BackupUnreadable,
    /// The restore finished but some steps failed.
    ImportPartial,
    /// Shown when a restore is declined.
    ImportCancelled,
    /// Note that live registration data is never part of a backup.
    LiveDataExcluded,
}

/// Source of translated message text.
pub trait Translator {
    /// Text for `message` in the current language.
    fn text(&self, message: Message) -> String;
}

/// Built-in message catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct Catalog {
    lang: Lang,
}

impl Catalog {
    #[must_use]
    pub const fn new(lang: Lang) -> Self {
        Self { lang }
    }

    #[must_use]
    pub const fn lang(&self) -> Lang {
        self.lang
    }

    const fn zh(message: Message) -> &'static str {
        match message {
            Message::ConfirmRestore => "匯入備份將覆蓋現有資料，確定要繼續嗎？",
            Message::ExportSucceeded => "備份資料已匯出！",
            Message::ExportFailed => "匯出備份失敗，請稍後再試",
            Message::ImportSucceeded => "備份資料匯入完成！",
            Message::ImportFailed => "匯入備份失敗，請確認檔案格式是否正確",
            Message::BackupUnreadable => "讀取備份檔案失敗，請確認檔案格式是否正確",
            Message::ImportPartial => "備份資料部分匯入，部分項目還原失敗",
            Message::ImportCancelled => "已取消匯入備份",
            Message::LiveDataExcluded => "實時掛號資料不包含在備份中",
        }
    }

    const fn en(message: Message) -> &'static str {
        match message {
            Message::ConfirmRestore => {
                "Importing a backup will overwrite existing data; are you sure you want to continue?"
            }
            Message::ExportSucceeded => "Backup exported!",
            Message::ExportFailed => "Failed to export backup, please try again later",
            Message::ImportSucceeded => "Backup import complete!",
            Message::ImportFailed => "Failed to import backup, please check the file format",
            Message::BackupUnreadable => "Failed to read backup file, please check the file format",
            Message::ImportPartial => "Backup partially imported; some items failed to restore",
            Message::ImportCancelled => "Backup import cancelled",
            Message::LiveDataExcluded => "Real-time registration data is not included in backups",
        }
    }
}

impl Translator for Catalog {
    fn text(&self, message: Message) -> String {
        match self.lang {
            Lang::Zh => Self::zh(message),
            Lang::En => Self::en(message),
        }
        .to_string()
    }
}
