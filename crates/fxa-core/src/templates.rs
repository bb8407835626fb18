//! Reply texts. Markdown-ish (`**bold**`, `_italic_`, `` `code` ``); each
//! channel renders it through `formatting`.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime};

use serde::Serialize;

use crate::{
    config::Config,
    currency::Currency,
    formatting::{format_amount, format_rate},
    intent::Malformed,
    rates::{Conversion, RateSheet},
};

/// A suggested follow-up. `command` goes back through the parser when chosen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuickAction {
    pub label: String,
    pub command: String,
}

impl QuickAction {
    pub fn new(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub quick_actions: Vec<QuickAction>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quick_actions: Vec::new(),
        }
    }

    pub fn with_actions(mut self, actions: Vec<QuickAction>) -> Self {
        self.quick_actions = actions;
        self
    }
}

pub const CONVERT_USAGE: &str = "/convert <amount> <from> to <to>";

#[derive(Clone, Debug)]
pub struct Templates {
    assistant_name: String,
    contact_url: Option<String>,
    base: Currency,
}

impl Templates {
    pub fn new(assistant_name: impl Into<String>, contact_url: Option<String>, base: Currency) -> Self {
        Self {
            assistant_name: assistant_name.into(),
            contact_url,
            base,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.assistant_name.clone(), cfg.contact_url.clone(), cfg.base_currency)
    }

    pub fn assistant_name(&self) -> &str {
        &self.assistant_name
    }

    fn footer(&self) -> String {
        match &self.contact_url {
            Some(url) => format!("\n\n🌐 Contact us: {url}"),
            None => String::new(),
        }
    }

    fn starter_actions(&self) -> Vec<QuickAction> {
        vec![
            QuickAction::new("📊 Today's rates", "/rates"),
            QuickAction::new("💵 100 USD", "100 USD"),
            QuickAction::new("🇨🇳 1000 CNY", "1000 CNY"),
            QuickAction::new("❓ Help", "/help"),
        ]
    }

    pub fn welcome(&self, sender_name: Option<&str>) -> Reply {
        let hello = match sender_name {
            Some(name) => format!("👋 Hello {name}!"),
            None => "👋 Hello!".to_string(),
        };
        let text = format!(
            "{hello} I'm **{name}**, your currency exchange assistant.\n\n\
             🤖 _I am an automated assistant. Rates are generated automatically; please confirm \
             them before any transaction._\n\n\
             I can:\n\
             - show today's selling rates (/rates)\n\
             - convert an amount, e.g. `100 USD` or `/convert 100 USD to XAF`\n\
             - answer questions about our service\n\n\
             Supported currencies: {list}{footer}",
            name = self.assistant_name,
            list = Currency::supported_list(),
            footer = self.footer(),
        );
        Reply::text(text).with_actions(self.starter_actions())
    }

    pub fn help(&self) -> Reply {
        let text = format!(
            "**How to use {name}**\n\n\
             /start - welcome message\n\
             /help - this help\n\
             /rates - today's selling rates\n\
             /rates AED - rates for one currency\n\
             `{CONVERT_USAGE}` - convert an amount\n\n\
             You can also just type:\n\
             - `100 USD` (converts to {base})\n\
             - `500 CNY to XOF`\n\
             - `rate for EUR`\n\n\
             Supported currencies: {list}{footer}",
            name = self.assistant_name,
            base = self.base,
            list = Currency::supported_list(),
            footer = self.footer(),
        );
        Reply::text(text).with_actions(vec![
            QuickAction::new("📊 Today's rates", "/rates"),
            QuickAction::new("💵 100 USD", "100 USD"),
        ])
    }

    pub fn rates(&self, sheet: &RateSheet, scope: Option<Currency>) -> Reply {
        let updated = sheet.updated_at.format("%Y-%m-%d %H:%M WAT");

        if let Some(row) = scope.and_then(|c| sheet.row(c)) {
            let c = row.currency;
            let text = format!(
                "{flag} **{c} selling rate**\n\n\
                 • 1 {c} = {xaf} XAF | {xof} XOF\n\n\
                 Reply with an amount, e.g. `100 {c}`\n\
                 📅 Updated: {updated}{footer}",
                flag = c.flag(),
                xaf = format_amount(row.xaf),
                xof = format_amount(row.xof),
                footer = self.footer(),
            );
            return Reply::text(text).with_actions(vec![
                QuickAction::new(format!("💱 100 {c}"), format!("100 {c}")),
                QuickAction::new("📊 All rates", "/rates"),
            ]);
        }

        let mut text = String::from("🏦 **TODAY'S SELLING RATES** 📈\n\n");
        for row in &sheet.rows {
            text.push_str(&format!(
                "• 1 {} = {} XAF | {} XOF\n",
                row.currency,
                format_amount(row.xaf),
                format_amount(row.xof)
            ));
        }
        text.push_str(&format!(
            "\n**Quick calculate:** reply `100 USD`, `500 CNY` or `200 EUR`\n\
             📅 Updated: {updated}\n\
             _Service fee included._{}",
            self.footer()
        ));

        Reply::text(text).with_actions(vec![
            QuickAction::new("💵 100 USD", "100 USD"),
            QuickAction::new("💰 100 USDT", "100 USDT"),
            QuickAction::new("🇪🇺 100 EUR", "100 EUR"),
        ])
    }

    pub fn conversion(&self, conv: &Conversion, sheet: &RateSheet) -> Reply {
        let Conversion {
            amount,
            from,
            to,
            rate,
            result,
        } = conv;

        let mut text = format!(
            "💱 **FX CALCULATION**\n\n**{} {from} → {} {to}**\n",
            format_amount(*amount),
            format_amount(*result)
        );

        // Buying a foreign currency: quote both local currencies.
        if !from.is_local() && to.is_local() {
            let other = if *to == Currency::Xaf {
                Currency::Xof
            } else {
                Currency::Xaf
            };
            if let Some(alt) = sheet.convert(*amount, *from, other) {
                text.push_str(&format!(
                    "**{} {from} → {} {other}**\n",
                    format_amount(*amount),
                    format_amount(alt.result)
                ));
            }
        }

        text.push_str(&format!(
            "\nRate: 1 {from} = {} {to}\n\
             _Service fee included._\n\
             📅 Updated: {}{}",
            format_rate(*rate),
            sheet.updated_at.format("%Y-%m-%d %H:%M WAT"),
            self.footer()
        ));

        Reply::text(text).with_actions(vec![
            QuickAction::new(
                format!("🔁 {to} → {from}"),
                format!("{} {to} to {from}", plain_amount(*result)),
            ),
            QuickAction::new("📊 All rates", "/rates"),
        ])
    }

    fn compact_rows(sheet: &RateSheet) -> String {
        sheet
            .rows
            .iter()
            .map(|row| {
                format!(
                    "{} **{}**: {} XAF | {} XOF\n",
                    row.currency.flag(),
                    row.currency,
                    format_amount(row.xaf),
                    format_amount(row.xof)
                )
            })
            .collect()
    }

    /// One line per currency, for busy group chats.
    pub fn group_rates(&self, sheet: &RateSheet) -> Reply {
        let text = format!(
            "💱 **{name} FX rates** - {updated}\n\n{rows}\n_Use /convert to calculate amounts._",
            name = self.assistant_name,
            updated = sheet.updated_at.format("%Y-%m-%d %H:%M WAT"),
            rows = Self::compact_rows(sheet),
        );
        Reply::text(text).with_actions(vec![
            QuickAction::new("💱 100 USD", "100 USD"),
            QuickAction::new("📊 Full details", "/rates"),
        ])
    }

    pub fn group_help(&self) -> Reply {
        Reply::text(format!(
            "🏢 **{name} - group commands**\n\n\
             /grouprates - compact rates for the group\n\
             /grouphelp - this help\n\
             `{CONVERT_USAGE}` - convert an amount\n\
             /enabledaily - daily rates broadcast (admins)\n\
             /disabledaily - stop the daily broadcast (admins)\n\n\
             In groups I answer commands, mentions of @me, and messages about rates \
             or a supported currency.",
            name = self.assistant_name,
        ))
    }

    pub fn group_only(&self) -> Reply {
        Reply::text("This command is only available in groups. Use /help for private chat commands.")
    }

    pub fn daily_enabled(&self, at: NaiveTime) -> Reply {
        Reply::text(format!(
            "✅ **Daily FX rates enabled!**\n\n\
             📅 Rates will be sent every day at {} WAT.\n\
             🔄 Use /disabledaily to stop.",
            at.format("%H:%M")
        ))
    }

    pub fn daily_disabled(&self) -> Reply {
        Reply::text(
            "✅ **Daily FX rates disabled.**\n\n\
             🔄 Use /enabledaily to re-enable.\n\
             💡 /grouprates still works anytime.",
        )
    }

    pub fn admins_only(&self) -> Reply {
        Reply::text("❌ Only group admins can change the daily rates broadcast.")
    }

    pub fn admin_unverified(&self) -> Reply {
        Reply::text("❌ Could not verify admin status.")
    }

    pub fn daily_broadcast(&self, sheet: &RateSheet, now: DateTime<FixedOffset>) -> Reply {
        Reply::text(format!(
            "🌅 **Good morning! Daily FX rates**\n\
             📅 {date}\n\n{rows}\n\
             💡 _Use /convert for calculations, /disabledaily to stop._{footer}",
            date = now.format("%A, %B %d, %Y"),
            rows = Self::compact_rows(sheet),
            footer = self.footer(),
        ))
    }

    pub fn malformed(&self, reason: &Malformed) -> Reply {
        Reply::text(format!(
            "❌ Sorry, I couldn't read that: {reason}.\n\n\
             Usage: `{CONVERT_USAGE}`\n\
             Example: `/convert 100 USD to XAF`\n\
             Rates for one currency: `/rates AED`\n\n\
             Supported currencies: {}",
            Currency::supported_list()
        ))
        .with_actions(vec![QuickAction::new("❓ Help", "/help")])
    }

    pub fn rates_unavailable(&self) -> Reply {
        Reply::text(format!(
            "⚠️ Unable to fetch current exchange rates. Please try again later.{}",
            self.footer()
        ))
    }

    /// Free-form question with no language model configured.
    pub fn assistant_unavailable(&self) -> Reply {
        Reply::text(format!(
            "I can help with rates and conversions. Try /rates, or send an amount such as \
             `100 USD` or `500 CNY to XOF`. Type /help for everything I understand.{}",
            self.footer()
        ))
        .with_actions(self.starter_actions())
    }

    pub fn assistant_failed(&self) -> Reply {
        Reply::text(format!(
            "😔 Sorry, I'm having trouble answering right now. Please try again in a moment, \
             or use /rates for today's rates.{}",
            self.footer()
        ))
    }

    pub fn too_many_messages(&self, retry_after: Duration) -> Reply {
        let secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
        Reply::text(format!(
            "⏳ You're sending messages too quickly. Please wait {secs}s and try again."
        ))
    }

    pub fn too_long(&self, max_len: usize) -> Reply {
        Reply::text(format!(
            "✂️ Your message is too long. Please keep it under {max_len} characters."
        ))
    }

    pub fn could_not_process(&self) -> Reply {
        Reply::text("Sorry, I couldn't process your message. Please try again.")
    }
}

/// Amount as the parser reads it back: no thousands separators.
fn plain_amount(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{v:.2}")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::rates::{MarketRates, Markups};

    fn templates() -> Templates {
        Templates::new("Eva", Some("https://fx.example.com".to_string()), Currency::Xaf)
    }

    fn sheet() -> RateSheet {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        RateSheet::from_market(&MarketRates::FALLBACK, &Markups::default(), now).unwrap()
    }

    #[test]
    fn welcome_carries_quick_actions() {
        let r = templates().welcome(Some("Amina"));
        assert!(r.text.starts_with("👋 Hello Amina!"));
        assert!(r.text.contains("**Eva**"));
        assert!(r.text.ends_with("https://fx.example.com"));
        assert!(r.quick_actions.iter().any(|a| a.command == "/rates"));
    }

    #[test]
    fn full_sheet_lists_every_foreign_currency() {
        let r = templates().rates(&sheet(), None);
        for c in Currency::FOREIGN {
            assert!(r.text.contains(&format!("• 1 {c} = ")), "{c}");
        }
        assert!(r.text.contains("• 1 USD = 604.50 XAF | 580.32 XOF"));
        assert!(r.text.contains("2024-05-01 10:30 WAT"));
    }

    #[test]
    fn local_scope_shows_full_sheet() {
        let r = templates().rates(&sheet(), Some(Currency::Xof));
        assert!(r.text.contains("TODAY'S SELLING RATES"));
    }

    #[test]
    fn scoped_sheet_shows_one_row() {
        let r = templates().rates(&sheet(), Some(Currency::Aed));
        assert!(r.text.contains("AED selling rate"));
        assert!(!r.text.contains("1 USD"));
        assert_eq!(r.quick_actions[0].command, "100 AED");
    }

    #[test]
    fn conversion_quotes_both_local_currencies() {
        let s = sheet();
        let conv = s.convert(100.0, Currency::Usd, Currency::Xaf).unwrap();
        let r = templates().conversion(&conv, &s);
        assert!(r.text.contains("**100 USD → 60,450 XAF**"));
        assert!(r.text.contains("**100 USD → 58,032 XOF**"));
        assert!(r.text.contains("Rate: 1 USD = 604.50 XAF"));
        assert_eq!(r.quick_actions[0].command, "60450 XAF to USD");
    }

    #[test]
    fn reverse_action_converts_back_to_the_original_amount() {
        let s = sheet();
        let conv = s.convert(250.0, Currency::Eur, Currency::Xof).unwrap();
        let r = templates().conversion(&conv, &s);
        let back = &r.quick_actions[0].command;
        assert!(back.ends_with(" XOF to EUR"), "{back}");
        assert!(!back.contains(','), "{back}");

        let amount = crate::intent::parse_amount(back.split(' ').next().unwrap()).unwrap();
        assert!((amount - conv.result).abs() < 0.01);
    }

    #[test]
    fn group_rates_are_one_line_per_currency() {
        let r = templates().group_rates(&sheet());
        assert!(r.text.contains("🇺🇸 **USD**: 604.50 XAF | 580.32 XOF"));
        assert!(r.text.contains("2024-05-01 10:30 WAT"));
        assert_eq!(r.quick_actions[1].command, "/rates");
    }

    #[test]
    fn daily_texts_name_the_time_and_date() {
        let t = templates();
        let at = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        assert!(t.daily_enabled(at).text.contains("10:00 WAT"));

        let s = sheet();
        let r = t.daily_broadcast(&s, s.updated_at);
        assert!(r.text.contains("Wednesday, May 01, 2024"));
        assert!(r.text.contains("**EUR**"));
    }

    #[test]
    fn malformed_names_the_syntax() {
        let r = templates().malformed(&Malformed::InvalidAmount("abc".to_string()));
        assert!(r.text.contains("'abc' is not a valid amount"));
        assert!(r.text.contains(CONVERT_USAGE));
    }

    #[test]
    fn rate_limit_reply_rounds_up() {
        let r = templates().too_many_messages(Duration::from_millis(1200));
        assert!(r.text.contains("wait 2s"));
    }
}
