//! Outgoing mail.
//!
//! The server does not speak SMTP itself. Messages are either spooled as
//! one RFC 5322 file per message into a directory watched by the local
//! mail transfer agent, or just logged.

use std::sync::atomic::{AtomicU64, Ordering};

/// An outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    /// Recipient address.
    pub to: String,

    /// Subject line.
    pub subject: String,

    /// HTML body.
    pub body: String,
}

/// Delivers outgoing mail.
pub trait Mailer: 'static + Send + Sync {
    /// Hand a message off for delivery.
    fn send(&self, mail: &Mail) -> std::io::Result<()>;
}

/// Trait-object [Mailer].
pub type DynMailer = std::sync::Arc<dyn Mailer>;

/// Construct the mailer selected by the config.
pub fn mailer_from_config(config: &crate::Config) -> DynMailer {
    match &config.mail_spool_dir {
        Some(dir) => std::sync::Arc::new(SpoolMailer::new(
            dir.clone(),
            config.mail_from.clone(),
        )),
        None => std::sync::Arc::new(LogMailer),
    }
}

/// Only log outgoing mail.
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, mail: &Mail) -> std::io::Result<()> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "mail (not sent)");
        Ok(())
    }
}

/// Write each message as a file into a spool directory.
#[derive(Debug)]
pub struct SpoolMailer {
    dir: std::path::PathBuf,
    from: String,
    seq: AtomicU64,
}

impl SpoolMailer {
    /// Construct a new spool mailer.
    pub fn new(dir: std::path::PathBuf, from: String) -> Self {
        Self {
            dir,
            from,
            seq: AtomicU64::new(0),
        }
    }

    fn render(&self, mail: &Mail, now: i64) -> std::io::Result<String> {
        for v in [&mail.to, &mail.subject, &self.from] {
            if v.contains(['\r', '\n']) {
                return Err(std::io::Error::other("HeaderInjection"));
            }
        }

        let date = chrono::DateTime::<chrono::Utc>::from_timestamp_micros(now)
            .ok_or_else(|| std::io::Error::other("InvalidDate"))?
            .to_rfc2822();

        Ok(format!(
            "From: {}\r\n\
             To: {}\r\n\
             Subject: {}\r\n\
             Date: {}\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: text/html; charset=utf-8\r\n\
             \r\n\
             {}\r\n",
            self.from,
            mail.to,
            mail.subject,
            date,
            mail.body,
        ))
    }
}

impl Mailer for SpoolMailer {
    fn send(&self, mail: &Mail) -> std::io::Result<()> {
        use std::io::Write;

        let now = crate::now();
        let content = self.render(mail, now)?;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!("{now}-{}-{seq}.eml", std::process::id());

        // write to a tempfile first so the MTA never picks up partial mail
        std::fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_data()?;
        tmp.persist(self.dir.join(&name))
            .map_err(|err| err.error)?;

        tracing::debug!(to = %mail.to, %name, "mail spooled");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn date_format() {
        let m = SpoolMailer::new("/nonexistent".into(), "from@example.com".into());
        let mail = Mail {
            to: "a@example.com".into(),
            subject: "Hello".into(),
            body: String::new(),
        };

        // 2024-02-29T23:59:59Z
        let out = m.render(&mail, 1_709_251_199_000_000).unwrap();
        assert!(out.contains("\r\nDate: Thu, 29 Feb 2024 23:59:59 +0000\r\n"));

        // 2021-05-15T13:54:25.5Z, sub-second part dropped
        let out = m.render(&mail, 1_621_086_865_500_000).unwrap();
        let date = out
            .lines()
            .find_map(|l| l.strip_prefix("Date: "))
            .unwrap();
        assert_eq!("Sat, 15 May 2021 13:54:25 +0000", date);
        assert_eq!(
            1_621_086_865,
            chrono::DateTime::parse_from_rfc2822(date).unwrap().timestamp()
        );
    }

    #[test]
    fn spool_writes_one_file_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let m = SpoolMailer::new(dir.path().into(), "from@example.com".into());

        for to in ["a@example.com", "b@example.com"] {
            m.send(&Mail {
                to: to.into(),
                subject: "Hello".into(),
                body: "<p>hi</p>".into(),
            })
            .unwrap();
        }

        let mut all = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| std::fs::read_to_string(e.unwrap().path()).unwrap())
            .collect::<Vec<_>>();
        all.sort();

        assert_eq!(2, all.len());
        assert!(all[0].starts_with("From: from@example.com\r\nTo: a@example.com\r\n"));
        assert!(all[0].contains("Subject: Hello\r\n"));
        assert!(all[0].ends_with("\r\n\r\n<p>hi</p>\r\n"));
        assert!(all[1].contains("To: b@example.com\r\n"));
    }

    #[test]
    fn spool_rejects_header_injection() {
        let dir = tempfile::tempdir().unwrap();
        let m = SpoolMailer::new(dir.path().into(), "from@example.com".into());
        assert!(m
            .send(&Mail {
                to: "a@example.com\r\nBcc: evil@example.com".into(),
                subject: "Hello".into(),
                body: String::new(),
            })
            .is_err());
        assert_eq!(0, std::fs::read_dir(dir.path()).unwrap().count());
    }
}
