//! Wizard driving: renders each booking step as an inline keyboard,
//! routes button callbacks and free-text input back into the wizard.

use chrono::Datelike;
use teloxide::{
    prelude::*,
    types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
};
use tokio::sync::Mutex;

use veluna_booking::models::{Service, Specialist};
use veluna_booking::promo::PromoStatus;
use veluna_booking::{calendar, BookingApi, BookingError, BookingWizard, SubmitOutcome, WizardOptions, WizardStep};

use crate::BotState;

/// What the next plain-text message from this chat means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingInput {
    FirstName,
    Email,
    Phone,
    PromoCode,
    BonusAmount,
}

/// One chat's booking session: the wizard plus the catalogs it picks from.
pub struct ChatSession {
    pub wizard: BookingWizard,
    pub services: Vec<Service>,
    pub specialists: Vec<Specialist>,
    pub pending: Option<PendingInput>,
}

// ── Entry points ──

/// `/start`: a fresh wizard, discarding any previous draft for this chat.
pub async fn start_wizard(bot: &Bot, chat_id: ChatId, state: &BotState) -> anyhow::Result<()> {
    let services = match state.api.list_services().await {
        Ok(services) => services,
        Err(err) => {
            tracing::warn!("service list fetch failed: {err}");
            bot.send_message(chat_id, "😔 Запись временно недоступна, попробуй позже.")
                .await?;
            return Ok(());
        }
    };
    let specialists = state.api.list_specialists().await.unwrap_or_else(|err| {
        tracing::warn!("specialist list fetch failed: {err}");
        Vec::new()
    });

    let options = WizardOptions {
        user_id: Some(chat_id.0),
        notices: Some(state.notices.clone()),
        ..Default::default()
    };
    let wizard = BookingWizard::new(state.config.clone(), options);
    let session = std::sync::Arc::new(Mutex::new(ChatSession {
        wizard,
        services,
        specialists,
        pending: None,
    }));
    state.sessions.insert(chat_id, session.clone());

    bot.send_message(
        chat_id,
        "🌿 <b>Veluna</b>\n\nПривет! Я помогу записаться в студию.\nВыбери услугу:",
    )
    .parse_mode(ParseMode::Html)
    .await?;

    let mut session = session.lock().await;
    render_step(bot, chat_id, &mut session).await
}

/// `/mybookings`: upcoming appointments with cancel buttons.
pub async fn show_my_bookings(bot: &Bot, chat_id: ChatId, state: &BotState) -> anyhow::Result<()> {
    let appointments = match state.api.list_user_appointments(chat_id.0).await {
        Ok(appointments) => appointments,
        Err(err) => {
            tracing::warn!("appointment list fetch failed: {err}");
            bot.send_message(chat_id, "Не получилось загрузить записи, попробуй позже.")
                .await?;
            return Ok(());
        }
    };

    if appointments.is_empty() {
        bot.send_message(
            chat_id,
            "У тебя пока нет записей 🤷‍♀️\nНажми /start, чтобы записаться.",
        )
        .await?;
        return Ok(());
    }

    let mut text = "📋 <b>Твои записи:</b>\n\n".to_string();
    for appointment in &appointments {
        text.push_str(&format!(
            "💆 <b>{}</b>\n👩 {}\n📅 {} · {} — {}\n💰 {} ₽\n\n",
            appointment.service_name,
            appointment.specialist_name,
            format_date_ru(&appointment.date),
            appointment.start_time,
            appointment.end_time,
            appointment.price,
        ));
    }

    let buttons: Vec<Vec<InlineKeyboardButton>> = appointments
        .iter()
        .map(|appointment| {
            vec![InlineKeyboardButton::callback(
                format!(
                    "❌ Отменить {} ({})",
                    appointment.service_name,
                    format_date_ru(&appointment.date)
                ),
                format!("cancel:{}", appointment.id),
            )]
        })
        .collect();

    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(InlineKeyboardMarkup::new(buttons))
        .await?;

    Ok(())
}

// ── Callback routing ──

pub async fn handle_callback(bot: Bot, q: CallbackQuery, state: &BotState) -> anyhow::Result<()> {
    let data = q.data.clone().unwrap_or_default();
    let Some(chat_id) = q.message.as_ref().map(|m| m.chat().id) else {
        bot.answer_callback_query(&q.id).await?;
        return Ok(());
    };

    // Works without a wizard session.
    if let Some(id) = data.strip_prefix("cancel:").and_then(|v| v.parse::<i64>().ok()) {
        match state.api.cancel_appointment(id).await {
            Ok(()) => {
                bot.answer_callback_query(&q.id).text("✅ Запись отменена").await?;
                bot.send_message(chat_id, "✅ Запись отменена.").await?;
            }
            Err(err) => {
                tracing::warn!("cancel appointment {id} failed: {err}");
                bot.answer_callback_query(&q.id)
                    .text("Не получилось отменить, попробуй позже")
                    .await?;
            }
        }
        return Ok(());
    }
    if data == "restart" {
        bot.answer_callback_query(&q.id).await?;
        return start_wizard(&bot, chat_id, state).await;
    }

    let Some(session) = state.sessions.get(&chat_id).map(|entry| entry.value().clone()) else {
        bot.answer_callback_query(&q.id)
            .text("Начни запись заново: /start")
            .await?;
        return Ok(());
    };
    let mut session = session.lock().await;

    if let Some(service_id) = data.strip_prefix("svc:").and_then(|v| v.parse::<i64>().ok()) {
        let Some(service) = session.services.iter().find(|s| s.id == service_id).cloned() else {
            bot.answer_callback_query(&q.id).text("Услуга не найдена").await?;
            return Ok(());
        };
        match session.wizard.select_service(service) {
            Ok(()) => {
                bot.answer_callback_query(&q.id).await?;
                after_transition(&bot, chat_id, &mut session, state).await?;
            }
            Err(err) => alert(&bot, &q.id, &err).await?,
        }
    } else if let Some(specialist_id) = data.strip_prefix("spec:").and_then(|v| v.parse::<i64>().ok())
    {
        let Some(specialist) = session
            .specialists
            .iter()
            .find(|s| s.id == specialist_id)
            .cloned()
        else {
            bot.answer_callback_query(&q.id).text("Мастер не найден").await?;
            return Ok(());
        };
        match session.wizard.select_specialist(specialist) {
            Ok(()) => {
                bot.answer_callback_query(&q.id).await?;
                after_transition(&bot, chat_id, &mut session, state).await?;
            }
            Err(err) => alert(&bot, &q.id, &err).await?,
        }
    } else if let Some(date) = data.strip_prefix("date:") {
        match session.wizard.select_date(date) {
            Ok(()) => {
                bot.answer_callback_query(&q.id).await?;
                after_transition(&bot, chat_id, &mut session, state).await?;
            }
            Err(err) => alert(&bot, &q.id, &err).await?,
        }
    } else if let Some(index) = data.strip_prefix("slot:").and_then(|v| v.parse::<usize>().ok()) {
        let Some(slot) = session.wizard.time_slots().get(index).cloned() else {
            bot.answer_callback_query(&q.id).text("Выбери время из списка").await?;
            return Ok(());
        };
        match session.wizard.select_slot(slot) {
            Ok(()) => {
                bot.answer_callback_query(&q.id).await?;
                after_transition(&bot, chat_id, &mut session, state).await?;
            }
            Err(err) => alert(&bot, &q.id, &err).await?,
        }
    } else {
        match data.as_str() {
            "back" => {
                session.wizard.back();
                session.pending = None;
                bot.answer_callback_query(&q.id).await?;
                render_step(&bot, chat_id, &mut session).await?;
            }
            "promo" => {
                session.pending = Some(PendingInput::PromoCode);
                bot.answer_callback_query(&q.id).await?;
                bot.send_message(chat_id, "🏷 Введи промокод:").await?;
            }
            "promo_cancel" => {
                session.wizard.cancel_promo();
                bot.answer_callback_query(&q.id).text("Промокод убран").await?;
                send_summary(&bot, chat_id, &session).await?;
            }
            "bonus" => {
                bot.answer_callback_query(&q.id).await?;
                toggle_bonus(&bot, chat_id, &mut session, state).await?;
            }
            "bonus_amount" => {
                session.pending = Some(PendingInput::BonusAmount);
                let cap = session
                    .wizard
                    .bonus()
                    .cap(session.wizard.price_after_promo());
                bot.answer_callback_query(&q.id).await?;
                bot.send_message(chat_id, format!("🎁 Сколько бонусов списать? (до {cap} ₽)"))
                    .await?;
            }
            "submit" => {
                submit(&bot, &q.id, chat_id, &mut session, state).await?;
            }
            _ => {
                bot.answer_callback_query(&q.id).await?;
            }
        }
    }

    Ok(())
}

// ── Free-text input ──

pub async fn handle_text(bot: Bot, msg: Message, state: &BotState) -> anyhow::Result<()> {
    let Some(text) = msg.text() else { return Ok(()) };
    let chat_id = msg.chat.id;
    let Some(session) = state.sessions.get(&chat_id).map(|entry| entry.value().clone()) else {
        return Ok(());
    };
    let mut session = session.lock().await;
    let Some(pending) = session.pending else { return Ok(()) };
    let text = text.trim().to_string();

    match pending {
        PendingInput::FirstName => {
            session.wizard.contact_mut().first_name = text;
            session.pending = Some(PendingInput::Email);
            bot.send_message(chat_id, "📧 Твой email:").await?;
        }
        PendingInput::Email => {
            if !text.contains('@') {
                bot.send_message(chat_id, "Похоже, это не email. Попробуй ещё раз:")
                    .await?;
                return Ok(());
            }
            session.wizard.contact_mut().email = text;
            session.pending = Some(PendingInput::Phone);
            bot.send_message(chat_id, "📱 Телефон:").await?;
        }
        PendingInput::Phone => {
            session.wizard.contact_mut().phone = text;
            session.pending = None;
            send_summary(&bot, chat_id, &session).await?;
        }
        PendingInput::PromoCode => {
            session.pending = None;
            match session.wizard.apply_promo(state.api.as_ref(), &text).await {
                Err(err) => {
                    bot.send_message(chat_id, err.to_string()).await?;
                }
                Ok(()) => {
                    let reply = match session.wizard.promo().status() {
                        PromoStatus::Applied => format!(
                            "✅ Промокод применён: −{} ₽",
                            session
                                .wizard
                                .promo()
                                .application()
                                .map_or(0, |p| p.discount_amount)
                        ),
                        _ => format!(
                            "😕 {}",
                            session
                                .wizard
                                .promo()
                                .message()
                                .unwrap_or("Промокод не применён")
                        ),
                    };
                    bot.send_message(chat_id, reply).await?;
                }
            }
            send_summary(&bot, chat_id, &session).await?;
        }
        PendingInput::BonusAmount => {
            session.pending = None;
            match text.parse::<i64>() {
                Ok(raw) => session.wizard.set_bonus_amount(raw),
                Err(_) => {
                    bot.send_message(chat_id, "Нужно число, например 300.").await?;
                }
            }
            send_summary(&bot, chat_id, &session).await?;
        }
    }

    Ok(())
}

// ── Step rendering ──

async fn render_step(bot: &Bot, chat_id: ChatId, session: &mut ChatSession) -> anyhow::Result<()> {
    match session.wizard.step() {
        WizardStep::ServiceSelect => {
            let specialist_id = session.wizard.draft().specialist.as_ref().map(|s| s.id);
            let buttons: Vec<Vec<InlineKeyboardButton>> = session
                .services
                .iter()
                .filter(|service| match specialist_id {
                    Some(id) => session
                        .specialists
                        .iter()
                        .find(|s| s.id == id)
                        .is_some_and(|s| s.offers(service.id)),
                    None => true,
                })
                .map(|service| {
                    vec![InlineKeyboardButton::callback(
                        format!("{} · {} ₽ · {} мин", service.name, service.price, service.duration),
                        format!("svc:{}", service.id),
                    )]
                })
                .collect();
            bot.send_message(chat_id, "💆 Выбери услугу:")
                .reply_markup(InlineKeyboardMarkup::new(buttons))
                .await?;
        }

        WizardStep::SpecialistSelect => {
            let service_id = session.wizard.draft().service.as_ref().map(|s| s.id);
            let mut buttons: Vec<Vec<InlineKeyboardButton>> = session
                .specialists
                .iter()
                .filter(|specialist| service_id.map_or(true, |id| specialist.offers(id)))
                .map(|specialist| {
                    vec![InlineKeyboardButton::callback(
                        format!("👩 {}", specialist.full_name()),
                        format!("spec:{}", specialist.id),
                    )]
                })
                .collect();
            buttons.push(back_row());
            bot.send_message(chat_id, "👩 Выбери мастера:")
                .reply_markup(InlineKeyboardMarkup::new(buttons))
                .await?;
        }

        WizardStep::DateSelect => {
            if session.wizard.available_dates().is_empty() {
                bot.send_message(chat_id, "Свободных дат пока нет 😔")
                    .reply_markup(InlineKeyboardMarkup::new(vec![back_row()]))
                    .await?;
                return Ok(());
            }
            let mut buttons: Vec<Vec<InlineKeyboardButton>> = Vec::new();
            for chunk in session
                .wizard
                .available_dates()
                .iter()
                .take(12)
                .collect::<Vec<_>>()
                .chunks(3)
            {
                buttons.push(
                    chunk
                        .iter()
                        .map(|date| {
                            InlineKeyboardButton::callback(
                                format_date_ru(date),
                                format!("date:{date}"),
                            )
                        })
                        .collect(),
                );
            }
            buttons.push(back_row());
            bot.send_message(chat_id, "📅 Выбери дату:")
                .reply_markup(InlineKeyboardMarkup::new(buttons))
                .await?;
        }

        WizardStep::TimeSelect => {
            let slots: Vec<(usize, String)> = session
                .wizard
                .time_slots()
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.available)
                .map(|(index, slot)| (index, format!("{} — {}", slot.start_time, slot.end_time)))
                .collect();
            if slots.is_empty() {
                bot.send_message(chat_id, "На эту дату свободного времени нет 😔")
                    .reply_markup(InlineKeyboardMarkup::new(vec![back_row()]))
                    .await?;
                return Ok(());
            }
            let mut buttons: Vec<Vec<InlineKeyboardButton>> = Vec::new();
            for chunk in slots.chunks(2) {
                buttons.push(
                    chunk
                        .iter()
                        .map(|(index, label)| {
                            InlineKeyboardButton::callback(label.clone(), format!("slot:{index}"))
                        })
                        .collect(),
                );
            }
            buttons.push(back_row());
            bot.send_message(chat_id, "🕐 Выбери время:")
                .reply_markup(InlineKeyboardMarkup::new(buttons))
                .await?;
        }

        WizardStep::DetailsEntry => {
            let contact_complete = {
                let contact = session.wizard.contact();
                !contact.first_name.trim().is_empty()
                    && !contact.email.trim().is_empty()
                    && !contact.phone.trim().is_empty()
            };
            if contact_complete {
                send_summary(bot, chat_id, session).await?;
            } else {
                session.pending = Some(PendingInput::FirstName);
                bot.send_message(chat_id, "✏️ Как тебя зовут?").await?;
            }
        }

        WizardStep::Success => {}
    }

    Ok(())
}

/// Let the transition window elapse, run the loads the new step depends
/// on, then render it.
async fn after_transition(
    bot: &Bot,
    chat_id: ChatId,
    session: &mut ChatSession,
    state: &BotState,
) -> anyhow::Result<()> {
    tokio::time::sleep(session.wizard.transition_delay()).await;

    match session.wizard.step() {
        WizardStep::DateSelect => {
            if let Err(err) = session.wizard.load_dates(state.api.as_ref()).await {
                tracing::warn!("date load skipped: {err}");
            }
        }
        WizardStep::TimeSelect => {
            if let Ok(Some(ruled_out)) = session.wizard.load_slots(state.api.as_ref()).await {
                bot.send_message(
                    chat_id,
                    format!(
                        "😔 {} — {}\nВыбери другую дату.",
                        format_date_ru(&ruled_out.date),
                        ruled_out.reason
                    ),
                )
                .await?;
            }
        }
        _ => {}
    }

    render_step(bot, chat_id, session).await
}

// ── Details step actions ──

async fn toggle_bonus(
    bot: &Bot,
    chat_id: ChatId,
    session: &mut ChatSession,
    state: &BotState,
) -> anyhow::Result<()> {
    if session.wizard.bonus().is_active() {
        session.wizard.toggle_bonus(false);
    } else {
        let user_id = session.wizard.user_id().unwrap_or(chat_id.0);
        match state.balances.get_or_fetch(state.api.as_ref(), user_id).await {
            Some(balance) => {
                session.wizard.set_bonus_balance(balance);
                session.wizard.toggle_bonus(true);
                if session.wizard.bonus().amount() == 0 {
                    bot.send_message(chat_id, "На бонусном счёте пока пусто 🤍").await?;
                }
            }
            None => {
                bot.send_message(chat_id, "Бонусный счёт временно недоступен, попробуй чуть позже.")
                    .await?;
            }
        }
    }
    send_summary(bot, chat_id, session).await
}

async fn submit(
    bot: &Bot,
    callback_id: &str,
    chat_id: ChatId,
    session: &mut ChatSession,
    state: &BotState,
) -> anyhow::Result<()> {
    match session.wizard.submit(state.api.as_ref()).await {
        Ok(SubmitOutcome::Created) => {
            bot.answer_callback_query(callback_id).await?;
            let Some(confirmation) = session.wizard.confirmation() else {
                return Ok(());
            };
            let link = calendar::google_calendar_url(confirmation);
            let keyboard = InlineKeyboardMarkup::new(vec![
                vec![InlineKeyboardButton::url(
                    "📆 Добавить в календарь",
                    link.parse().expect("calendar link is a valid URL"),
                )],
                vec![InlineKeyboardButton::callback("💆 Записаться ещё", "restart")],
            ]);
            bot.send_message(
                chat_id,
                format!(
                    "✅ <b>Готово! Запись №{}</b>\n\n\
                     💆 {}\n\
                     👩 {}\n\
                     📅 {} · {} — {}\n\
                     💰 {} ₽\n\n\
                     Ждём тебя! ✨",
                    confirmation.appointment_id,
                    confirmation.service.name,
                    confirmation.specialist.full_name(),
                    format_date_ru(&confirmation.date),
                    confirmation.slot.start_time,
                    confirmation.slot.end_time,
                    confirmation.final_price,
                ),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await?;
            // terminal: a new /start opens a fresh wizard
            state.sessions.remove(&chat_id);
        }
        Ok(SubmitOutcome::Failed(message)) => {
            bot.answer_callback_query(callback_id).await?;
            bot.send_message(chat_id, format!("❌ {message}\nПопробуй подтвердить ещё раз."))
                .await?;
        }
        Ok(SubmitOutcome::AlreadyInFlight) | Ok(SubmitOutcome::AlreadyCompleted) => {
            bot.answer_callback_query(callback_id).await?;
        }
        Err(BookingError::SessionExpired) => {
            bot.answer_callback_query(callback_id).await?;
            bot.send_message(chat_id, "⏳ Сессия истекла. Войди заново и повтори запись.")
                .await?;
        }
        Err(err) => {
            alert(bot, callback_id, &err).await?;
        }
    }
    Ok(())
}

async fn send_summary(bot: &Bot, chat_id: ChatId, session: &ChatSession) -> anyhow::Result<()> {
    let wizard = &session.wizard;
    let draft = wizard.draft();
    let (Some(service), Some(specialist), Some(date), Some(slot)) = (
        draft.service.as_ref(),
        draft.specialist.as_ref(),
        draft.date.as_deref(),
        draft.slot.as_ref(),
    ) else {
        return Ok(());
    };

    let mut text = format!(
        "📝 <b>Проверь запись:</b>\n\n\
         💆 {}\n\
         👩 {}\n\
         📅 {} · {} — {}\n\n\
         💰 Стоимость: {} ₽\n",
        service.name,
        specialist.full_name(),
        format_date_ru(date),
        slot.start_time,
        slot.end_time,
        wizard.base_price(),
    );
    if let Some(promo) = wizard.promo().application() {
        text.push_str(&format!(
            "🏷 Промокод {}: −{} ₽\n",
            promo.code, promo.discount_amount
        ));
    }
    if wizard.bonus().is_active() {
        text.push_str(&format!("🎁 Бонусы: −{} ₽\n", wizard.bonus().amount()));
    }
    text.push_str(&format!("\n➡️ <b>К оплате: {} ₽</b>", wizard.final_price()));

    let mut buttons: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    if wizard.promo().application().is_some() {
        buttons.push(vec![InlineKeyboardButton::callback(
            "🏷 Убрать промокод",
            "promo_cancel",
        )]);
    } else {
        buttons.push(vec![InlineKeyboardButton::callback("🏷 Промокод", "promo")]);
    }
    if wizard.bonus().is_active() {
        buttons.push(vec![
            InlineKeyboardButton::callback("🎁 Не списывать бонусы", "bonus"),
            InlineKeyboardButton::callback("✏️ Сумма бонусов", "bonus_amount"),
        ]);
    } else {
        buttons.push(vec![InlineKeyboardButton::callback(
            "🎁 Списать бонусы",
            "bonus",
        )]);
    }
    buttons.push(vec![InlineKeyboardButton::callback("✅ Подтвердить", "submit")]);
    buttons.push(back_row());

    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(InlineKeyboardMarkup::new(buttons))
        .await?;

    Ok(())
}

// ── Helpers ──

async fn alert(bot: &Bot, callback_id: &str, err: &BookingError) -> anyhow::Result<()> {
    bot.answer_callback_query(callback_id)
        .text(err.to_string())
        .await?;
    Ok(())
}

fn back_row() -> Vec<InlineKeyboardButton> {
    vec![InlineKeyboardButton::callback("⬅️ Назад", "back")]
}

fn format_date_ru(date: &str) -> String {
    let Ok(parsed) = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
        return date.to_string();
    };
    let month = match parsed.month() {
        1 => "января",
        2 => "февраля",
        3 => "марта",
        4 => "апреля",
        5 => "мая",
        6 => "июня",
        7 => "июля",
        8 => "августа",
        9 => "сентября",
        10 => "октября",
        11 => "ноября",
        _ => "декабря",
    };
    format!("{} {}", parsed.day(), month)
}
