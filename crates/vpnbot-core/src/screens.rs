//! Menu screens.
//!
//! Pure builders: data in, [`Screen`] out. The router decides which screen to
//! show; nothing here talks to the backend or the messenger.

use crate::{
    command::Command,
    config::Config,
    domain::{CatalogId, ServiceInstanceId},
    formatting::{escape_html, format_money},
    messaging::types::{InlineButton, InlineKeyboard, Screen},
    models::{Balance, CatalogItem, MarzbanKey, Payment, ServiceDetail, ServiceStatus, UserService},
};

pub const MSG_SYSTEM_ERROR: &str = "⚠️ Ошибка системы, попробуйте позже";
pub const MSG_UNKNOWN_COMMAND: &str = "Неизвестная команда";
pub const MSG_SERVICE_NOT_FOUND: &str = "⚠️ Услуга не найдена";
pub const MSG_TRIAL_UNAVAILABLE: &str = "⚠️ Тестовая услуга временно недоступна";
pub const MSG_TRIAL_NEEDS_INVITE: &str = "ℹ️ Тест доступен по специальной ссылке приглашения. \
Откройте бота по промо-ссылке и попробуйте снова.";
pub const MSG_QR_CAPTION: &str = "Ваш QR-код";

const BACK: &str = "⇦ Назад";

const HELP_TEXT: &str = "1️⃣ В разделе <b>\"Список ключей доступа\"</b> закажите новый ключ, \
выбрав подходящий тариф.

2️⃣ После оплаты (пункт меню <b>\"Баланс\" - \"✚ Пополнить баланс\"</b>) в том же разделе \
выберите созданный ключ и нажмите <b>\"Показать данные для подключения\"</b>.

3️⃣ Следуйте инструкциям в открывшемся окне.";

/// Static presentation settings, taken from [`Config`] once.
#[derive(Clone, Debug)]
pub struct Screens {
    logo_url: String,
    support_chat_url: Option<String>,
    news_channel_url: Option<String>,
    api_base_url: String,
    payments_profile: String,
    trial_item: Option<CatalogId>,
}

impl Screens {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            logo_url: cfg.logo_url.clone(),
            support_chat_url: cfg.support_chat_url.clone(),
            news_channel_url: cfg.news_channel_url.clone(),
            api_base_url: cfg.api.base_url.clone(),
            payments_profile: cfg.payments_profile.clone(),
            trial_item: cfg.trial.base_service_id.filter(|id| id.0 > 0),
        }
    }

    fn logo(&self, html: impl Into<String>) -> Screen {
        Screen::text(html).with_photo(self.logo_url.clone())
    }

    fn back_to(command: Command) -> InlineButton {
        InlineButton::command(BACK, command)
    }

    pub fn registration(&self) -> Screen {
        Screen::text("Для начала работы с Telegram ботом, пожалуйста, зарегистрируйтесь")
            .with_keyboard(
                InlineKeyboard::new()
                    .single(InlineButton::command("Регистрация ✍", Command::Register)),
            )
    }

    /// Main menu. `trial` is the offered trial item, if the gate allows one.
    pub fn main_menu(&self, trial: Option<&CatalogItem>) -> Screen {
        let mut kb = InlineKeyboard::new()
            .single(InlineButton::command("💰 Баланс", Command::Balance))
            .single(InlineButton::command("🗝 Список ключей доступа", Command::List));
        if let Some(item) = trial {
            kb = kb.single(trial_button(item));
        }
        kb = kb.single(InlineButton::command("🗓 Помощь", Command::Help));
        if let Some(url) = &self.news_channel_url {
            kb = kb.single(InlineButton::url("📣 Новости", url));
        }
        if let Some(url) = &self.support_chat_url {
            kb = kb.single(InlineButton::url("🛟 Поддержка", url));
        }

        self.logo("Создавайте и управляйте своими ключами доступа")
            .with_keyboard(kb)
    }

    pub fn balance(&self, balance: &Balance) -> Screen {
        let html = format!(
            "💰 <b>Баланс</b>: {}\n\nНеобходимо оплатить: <b>{}</b>",
            format_money(balance.balance),
            format_money(balance.forecast)
        );
        let kb = InlineKeyboard::new()
            .single(InlineButton::web_app(
                "✚ Пополнить баланс",
                self.top_up_url(balance.account_id),
            ))
            .single(InlineButton::command("☰ История платежей", Command::Payments))
            .single(Self::back_to(Command::Menu));
        self.logo(html).with_keyboard(kb)
    }

    /// Payment web-app URL for `account_id`.
    pub fn top_up_url(&self, account_id: i64) -> String {
        format!(
            "{}/shm/v1/public/tg_payments_webapp?format=html&user_id={}&profile={}",
            self.api_base_url,
            account_id,
            encode_query_value(&self.payments_profile)
        )
    }

    pub fn service_list(&self, services: &[UserService]) -> Screen {
        let mut kb = InlineKeyboard::new();
        for svc in services {
            kb = kb.single(InlineButton::command(
                format!("{} - {}", list_icon(&svc.status), svc.name),
                Command::Service(svc.instance_id()),
            ));
        }
        kb = kb
            .single(InlineButton::command("🛒 Новый ключ", Command::PriceList))
            .single(Self::back_to(Command::Menu));
        self.logo("🗝 Ваши ключи:").with_keyboard(kb)
    }

    /// Orderable items; the trial (when offered) goes first and is never
    /// listed twice.
    pub fn price_list(&self, trial: Option<&CatalogItem>, catalog: &[CatalogItem]) -> Screen {
        let mut kb = InlineKeyboard::new();
        if let Some(item) = trial {
            kb = kb.single(trial_button(item));
        }
        for item in catalog {
            if self.trial_item == Some(item.catalog_id()) {
                continue;
            }
            kb = kb.single(InlineButton::command(
                format!("🛒 {} - {} руб.", item.name, format_money(item.cost)),
                Command::Order(item.catalog_id()),
            ));
        }
        kb = kb.single(Self::back_to(Command::Menu));
        self.logo("☷ Выберите услугу для заказа:").with_keyboard(kb)
    }

    pub fn service_detail(&self, detail: &ServiceDetail) -> Screen {
        let svc = &detail.service;
        let id = svc.instance_id();
        let (icon, label) = detail_status(&svc.status);

        let mut html = format!("<b>Ключ</b>: {icon} {}", escape_html(&svc.name));
        if let Some(expire) = svc.expire.as_deref().filter(|e| !e.is_empty()) {
            html.push_str(&format!("\n\n<b>Оплачен до</b>: {}", escape_html(expire)));
        }
        html.push_str(&format!("\n\n<b>Статус</b>: {label}"));

        let mut kb = InlineKeyboard::new();
        if svc.status == ServiceStatus::Active {
            match (&detail.marzban, svc.is_marzban()) {
                (Some(key), true) => {
                    kb = kb.row(vec![
                        InlineButton::web_app(
                            "Показать данные для подключения",
                            format!("{}?telegram=true", key.subscription_url),
                        ),
                        InlineButton::command(
                            "Показать ссылку подписки",
                            Command::ShowMarzbanKeys(id),
                        ),
                    ]);
                }
                (None, true) => {}
                (_, false) => {
                    kb = kb.row(vec![
                        InlineButton::command("🗝 Скачать ключ", Command::DownloadKey(id)),
                        InlineButton::command("👀 Показать QR код", Command::ShowQr(id)),
                    ]);
                }
            }
        }
        if matches!(svc.status, ServiceStatus::NotPaid | ServiceStatus::Blocked) {
            kb = kb.single(InlineButton::command("💰 Оплатить", Command::Balance));
        }
        if svc.status != ServiceStatus::Progress {
            kb = kb.single(InlineButton::command("❌ Удалить ключ", Command::Delete(id)));
        }
        kb = kb.single(Self::back_to(Command::List));

        self.logo(html).with_keyboard(kb)
    }

    pub fn delete_confirmation(&self, id: ServiceInstanceId) -> Screen {
        Screen::text(
            "🤔 <b>Подтвердите удаление услуги. Услугу нельзя будет восстановить!</b>",
        )
        .with_keyboard(
            InlineKeyboard::new()
                .single(InlineButton::command(
                    "🧨 ДА, УДАЛИТЬ! 🔥",
                    Command::DeleteConfirmed(id),
                ))
                .single(Self::back_to(Command::List)),
        )
    }

    pub fn help(&self) -> Screen {
        let mut kb = InlineKeyboard::new();
        if let Some(url) = &self.support_chat_url {
            kb = kb.single(InlineButton::url("Чат поддержки", url));
        }
        kb = kb.single(Self::back_to(Command::Menu));
        self.logo(HELP_TEXT).with_keyboard(kb)
    }

    pub fn payments(&self, payments: &[Payment]) -> Screen {
        let mut kb = InlineKeyboard::new();
        for pay in payments {
            kb = kb.single(InlineButton::command(
                format!("Дата: {}, Сумма: {} руб.", pay.date, format_money(pay.money)),
                Command::Menu,
            ));
        }
        kb = kb.single(Self::back_to(Command::Menu));
        self.logo("Платежи").with_keyboard(kb)
    }
}

/// Apology shown when `command` failed for a reason other than a missing
/// account. Never includes error details.
pub fn failure_message(command: Option<Command>) -> &'static str {
    match command {
        Some(Command::List) => "⚠️ Произошла ошибка при получении списка услуг",
        Some(Command::PriceList) => "⚠️ Не удалось загрузить список услуг. Попробуйте позже.",
        Some(Command::Order(_)) => "⚠️ Произошла ошибка при заказе услуги",
        Some(Command::Trial) => "⚠️ Не удалось выдать тест. Попробуйте позже.",
        Some(Command::Service(_)) | Some(Command::ShowMarzbanKeys(_)) => {
            "⚠️ Произошла ошибка при получении информации по услуге"
        }
        Some(Command::DownloadKey(_)) => "⚠️ Ошибка загрузки файла ключа",
        Some(Command::ShowQr(_)) => "⚠️ Не удалось создать QR-код",
        Some(Command::DeleteConfirmed(_)) => "⚠️ Ошибка при удалении услуги",
        Some(Command::Register) => "⚠️ Ошибка регистрации. Пожалуйста, попробуйте позже.",
        Some(Command::Payments) => "⚠️ Не удалось получить данные о платежах",
        _ => MSG_SYSTEM_ERROR,
    }
}

/// Message for a chat that already consumed the trial.
pub fn trial_already_claimed(item_name: Option<&str>) -> String {
    match item_name.filter(|n| !n.trim().is_empty()) {
        Some(name) => format!("ℹ️ Услуга '{}' уже была заказана ранее", escape_html(name)),
        None => "ℹ️ Тестовая услуга уже была заказана ранее".to_string(),
    }
}

pub fn subscription_caption(key: &MarzbanKey) -> String {
    format!(
        "<b>Subscription URL:</b>\n<code>{}</code>",
        escape_html(&key.subscription_url)
    )
}

/// Caption for a single Marzban connection link, labeled by protocol.
pub fn link_caption(link: &str) -> String {
    let label = if link.starts_with("ss") {
        "ShadowSocks"
    } else {
        "VLESS TCP"
    };
    format!("<b>{label}:</b>\n<code>{}</code>", escape_html(link))
}

pub fn key_file_name(id: ServiceInstanceId) -> String {
    format!("vpn{id}.conf")
}

fn trial_button(item: &CatalogItem) -> InlineButton {
    InlineButton::command(item.name.clone(), Command::Trial)
}

fn list_icon(status: &ServiceStatus) -> &'static str {
    match status {
        ServiceStatus::Active => "✅",
        ServiceStatus::Blocked => "❌",
        _ => "⏳",
    }
}

fn detail_status(status: &ServiceStatus) -> (&'static str, &'static str) {
    match status {
        ServiceStatus::Active => ("✅", "Работает"),
        ServiceStatus::Blocked => ("❌", "Заблокирована"),
        ServiceStatus::NotPaid => ("💰", "Ожидает оплаты"),
        _ => ("⏳", "Обработка"),
    }
}

fn encode_query_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::TrialConfig,
        messaging::types::ButtonAction,
        testing::{catalog_item, test_config, user_service},
    };

    fn screens() -> Screens {
        let mut cfg = test_config();
        cfg.support_chat_url = Some("https://t.me/support".to_string());
        cfg.trial = TrialConfig {
            enabled: true,
            base_service_id: Some(CatalogId(8)),
            ..TrialConfig::default()
        };
        Screens::from_config(&cfg)
    }

    fn labels(screen: &Screen) -> Vec<String> {
        screen
            .keyboard
            .rows
            .iter()
            .flatten()
            .map(|b| b.label.clone())
            .collect()
    }

    #[test]
    fn main_menu_places_trial_after_keys() {
        let s = screens();
        let trial = catalog_item(8, "Тест 3 дня", 0.0, 0.1);
        let menu = s.main_menu(Some(&trial));
        let l = labels(&menu);
        assert_eq!(l[2], "Тест 3 дня");
        assert_eq!(l.last().map(String::as_str), Some("🛟 Поддержка"));
        assert!(menu.photo_url.is_some());

        let without = s.main_menu(None);
        assert!(!without.keyboard.callbacks().any(|c| c == "trial"));
    }

    #[test]
    fn price_list_never_duplicates_trial_item() {
        let s = screens();
        let trial = catalog_item(8, "Тест", 0.0, 0.1);
        let catalog = vec![trial.clone(), catalog_item(2, "Месяц", 150.0, 1.0)];

        let with = s.price_list(Some(&trial), &catalog);
        let cbs: Vec<&str> = with.keyboard.callbacks().collect();
        assert_eq!(cbs, vec!["trial", "serviceorder|2", "menu"]);

        let without = s.price_list(None, &catalog);
        let cbs: Vec<&str> = without.keyboard.callbacks().collect();
        assert_eq!(cbs, vec!["serviceorder|2", "menu"]);
        assert_eq!(labels(&without)[0], "🛒 Месяц - 150.00 руб.");
    }

    #[test]
    fn detail_buttons_follow_status() {
        let s = screens();
        let detail = |status: &str, category: &str, marzban: Option<MarzbanKey>| ServiceDetail {
            service: user_service(5, 7, status, category),
            marzban,
        };

        let wg = s.service_detail(&detail("ACTIVE", "vpn-wg", None));
        let cbs: Vec<&str> = wg.keyboard.callbacks().collect();
        assert_eq!(cbs, vec!["download_qr|5", "show_qr|5", "delete|5", "list"]);

        let key = MarzbanKey {
            subscription_url: "https://sub.example/abc".to_string(),
            links: vec![],
        };
        let mz = s.service_detail(&detail("ACTIVE", "vpn-mz-nl", Some(key)));
        assert_eq!(
            mz.keyboard.rows[0][0].action,
            ButtonAction::WebApp("https://sub.example/abc?telegram=true".to_string())
        );
        assert_eq!(mz.keyboard.rows[0][1].action, ButtonAction::Callback("show_mz_keys|5".into()));

        let unpaid = s.service_detail(&detail("NOT PAID", "vpn-wg", None));
        let cbs: Vec<&str> = unpaid.keyboard.callbacks().collect();
        assert_eq!(cbs, vec!["balance", "delete|5", "list"]);
        assert!(unpaid.html.contains("Ожидает оплаты"));

        let progress = s.service_detail(&detail("PROGRESS", "vpn-wg", None));
        let cbs: Vec<&str> = progress.keyboard.callbacks().collect();
        assert_eq!(cbs, vec!["list"]);
    }

    #[test]
    fn balance_links_payment_web_app() {
        let mut cfg = test_config();
        cfg.payments_profile = "tg bot".to_string();
        let s = Screens::from_config(&cfg);
        let screen = s.balance(&Balance {
            account_id: 7,
            balance: 12.5,
            forecast: 150.0,
        });
        assert!(screen.html.contains("12.50"));
        assert!(screen.html.contains("<b>150.00</b>"));
        assert_eq!(
            screen.keyboard.rows[0][0].action,
            ButtonAction::WebApp(
                "https://shm.example/shm/v1/public/tg_payments_webapp?format=html&user_id=7&profile=tg+bot"
                    .to_string()
            )
        );
    }

    #[test]
    fn link_caption_labels_protocol() {
        assert!(link_caption("ss://abc").starts_with("<b>ShadowSocks:</b>"));
        assert!(link_caption("vless://abc").starts_with("<b>VLESS TCP:</b>"));
        assert_eq!(key_file_name(ServiceInstanceId(12)), "vpn12.conf");
    }

    #[test]
    fn service_names_are_escaped() {
        let s = screens();
        let mut svc = user_service(5, 7, "ACTIVE", "vpn-wg");
        svc.name = "<b>x</b>".to_string();
        let screen = s.service_detail(&ServiceDetail {
            service: svc,
            marzban: None,
        });
        assert!(screen.html.contains("&lt;b&gt;x&lt;/b&gt;"));
    }
}
