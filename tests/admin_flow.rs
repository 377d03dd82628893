mod common;

use anyhow::Result;
use booking::domain::JobStatus;
use booking::error::BookingError;
use booking::lifecycle::{AdminEdit, StatusChange, TranslatorRef};
use booking::notify::{EmailTemplate, NotificationType};
use chrono::Duration;
use common::{admin, customer, translator, Engine, SOMALI};

fn with_comment(comment: &str) -> AdminEdit {
    AdminEdit {
        admin_comment: Some(comment.to_string()),
        ..AdminEdit::default()
    }
}

#[tokio::test]
async fn completion_needs_a_session_time() -> Result<()> {
    let engine = Engine::new().await;
    let requester = engine.add(customer("Kund")).await;
    let interpreter = engine.add(translator("Amina")).await;
    let operator = engine.add(admin("Ops")).await;
    let job = engine
        .started(&requester, &interpreter, Duration::hours(2))
        .await?;

    let change = engine
        .service
        .change_status(job.id, &operator, JobStatus::Completed, with_comment("done"))
        .await?;
    assert_eq!(
        change,
        StatusChange::NotChanged {
            field: "session_time"
        }
    );
    assert_eq!(engine.reload(job.id).await?.status, JobStatus::Started);
    assert!(engine.store.audit().await.is_empty());

    let change = engine
        .service
        .change_status(
            job.id,
            &operator,
            JobStatus::Completed,
            AdminEdit {
                session_time: Some("1:05".into()),
                ..AdminEdit::default()
            },
        )
        .await?;
    assert_eq!(
        change,
        StatusChange::NotChanged {
            field: "admin_comment"
        }
    );
    Ok(())
}

#[tokio::test]
async fn admin_completion_closes_the_assignment_and_mails_both_sides() -> Result<()> {
    let engine = Engine::new().await;
    let requester = engine.add(customer("Kund")).await;
    let interpreter = engine.add(translator("Amina")).await;
    let operator = engine.add(admin("Ops")).await;
    let job = engine
        .started(&requester, &interpreter, Duration::hours(2))
        .await?;
    engine.gateway.clear().await;
    engine.clock.advance(Duration::hours(4));

    let change = engine
        .service
        .change_status(
            job.id,
            &operator,
            JobStatus::Completed,
            AdminEdit {
                admin_comment: Some("Confirmed by phone".into()),
                session_time: Some("1:05".into()),
                ..AdminEdit::default()
            },
        )
        .await?;
    assert_eq!(
        change,
        StatusChange::Changed {
            from: JobStatus::Started,
            to: JobStatus::Completed
        }
    );

    let stored = engine.reload(job.id).await?;
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.session_time.as_deref(), Some("1:5:0"));
    assert_eq!(stored.admin_comment.as_deref(), Some("Confirmed by phone"));

    let history = engine.store.assignments_for(job.id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].completed_by, Some(operator.id));

    let audit = engine.store.audit().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].field, "status");
    assert_eq!(audit[0].old_value.as_deref(), Some("started"));
    assert_eq!(audit[0].new_value.as_deref(), Some("completed"));
    assert_eq!(audit[0].actor_id, operator.id);

    let emails = engine.gateway.emails().await;
    assert_eq!(emails.len(), 2);
    assert!(emails.iter().all(|mail| mail.template == EmailTemplate::SessionEnded));
    Ok(())
}

#[tokio::test]
async fn assigning_by_email_books_the_translator_and_sends_reminders() -> Result<()> {
    let engine = Engine::new().await;
    let requester = engine.add(customer("Kund")).await;
    let interpreter = engine.add(translator("Amina")).await;
    let operator = engine.add(admin("Ops")).await;
    let job = engine.pending(&requester, Duration::hours(30)).await?;

    let outcome = engine
        .service
        .update_job(
            job.id,
            &operator,
            AdminEdit {
                status: Some(JobStatus::Assigned),
                translator: Some(TranslatorRef::Email("AMINA@translator.example".into())),
                admin_comment: Some("Booked over the phone".into()),
                ..AdminEdit::default()
            },
        )
        .await?;
    assert_eq!(
        outcome.status,
        StatusChange::Changed {
            from: JobStatus::Pending,
            to: JobStatus::Assigned
        }
    );
    assert!(outcome.notified);
    assert_eq!(engine.reload(job.id).await?.status, JobStatus::Assigned);

    let history = engine.store.assignments_for(job.id).await;
    assert_eq!(history.len(), 1);
    assert!(history[0].is_open());
    assert_eq!(history[0].translator_id, interpreter.id);

    let fields: Vec<&str> = outcome.audit.iter().map(|entry| entry.field.as_str()).collect();
    assert_eq!(fields, vec!["status", "translator"]);

    let emails = engine.gateway.emails().await;
    let templates: Vec<(EmailTemplate, &str)> = emails
        .iter()
        .map(|mail| (mail.template, mail.to.as_str()))
        .collect();
    assert_eq!(
        templates,
        vec![
            (EmailTemplate::JobAccepted, requester.email.as_str()),
            (
                EmailTemplate::JobChangedTranslatorCustomer,
                requester.email.as_str()
            ),
            (
                EmailTemplate::JobChangedTranslatorNewTranslator,
                interpreter.email.as_str()
            ),
        ]
    );

    let pushes = engine.gateway.pushes().await;
    assert_eq!(pushes.len(), 2);
    assert!(pushes
        .iter()
        .all(|push| push.message.notification_type == NotificationType::SessionStartRemind));
    assert_eq!(pushes[0].recipients, vec![requester.id]);
    assert_eq!(pushes[1].recipients, vec![interpreter.id]);
    Ok(())
}

#[tokio::test]
async fn assigning_without_a_translator_changes_nothing() -> Result<()> {
    let engine = Engine::new().await;
    let requester = engine.add(customer("Kund")).await;
    let interpreter = engine.add(translator("Amina")).await;
    let operator = engine.add(admin("Ops")).await;
    let job = engine.pending(&requester, Duration::hours(30)).await?;

    let change = engine
        .service
        .change_status(job.id, &operator, JobStatus::Assigned, with_comment("booked"))
        .await?;
    assert_eq!(change, StatusChange::NotChanged { field: "translator" });

    let outcome = engine
        .service
        .update_job(
            job.id,
            &operator,
            AdminEdit {
                translator: Some(TranslatorRef::Id(interpreter.id)),
                ..AdminEdit::default()
            },
        )
        .await?;
    assert_eq!(outcome.status, StatusChange::NotChanged { field: "translator" });
    assert_eq!(engine.reload(job.id).await?.status, JobStatus::Pending);
    assert_eq!(engine.store.open_assignments(job.id).await, 0);
    assert!(engine.gateway.emails().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_or_non_translator_picks_are_rejected() -> Result<()> {
    let engine = Engine::new().await;
    let requester = engine.add(customer("Kund")).await;
    let operator = engine.add(admin("Ops")).await;
    let job = engine.pending(&requester, Duration::hours(30)).await?;

    let edit = |translator: TranslatorRef| AdminEdit {
        status: Some(JobStatus::Assigned),
        translator: Some(translator),
        admin_comment: Some("booked".into()),
        ..AdminEdit::default()
    };

    let err = engine
        .service
        .update_job(job.id, &operator, edit(TranslatorRef::Email("nobody@x.example".into())))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound("translator")));

    let err = engine
        .service
        .update_job(job.id, &operator, edit(TranslatorRef::Id(requester.id)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::Validation {
            field: "translator",
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn moving_the_due_time_notifies_both_sides_until_it_has_passed() -> Result<()> {
    let engine = Engine::new().await;
    let requester = engine.add(customer("Kund")).await;
    let interpreter = engine.add(translator("Amina")).await;
    let operator = engine.add(admin("Ops")).await;
    let job = engine
        .assigned(&requester, &interpreter, Duration::hours(48))
        .await?;
    engine.gateway.clear().await;

    let later = job.due + Duration::hours(24);
    let outcome = engine
        .service
        .update_job(
            job.id,
            &operator,
            AdminEdit {
                due: Some(later),
                ..AdminEdit::default()
            },
        )
        .await?;
    assert_eq!(outcome.status, StatusChange::NotRequested);
    assert!(outcome.notified);
    assert_eq!(outcome.audit.len(), 1);
    assert_eq!(outcome.audit[0].field, "due");
    assert_eq!(engine.reload(job.id).await?.due, later);
    assert_eq!(engine.reload(job.id).await?.status, JobStatus::Assigned);

    let emails = engine.gateway.emails().await;
    assert_eq!(emails.len(), 2);
    assert!(emails.iter().all(|mail| mail.template == EmailTemplate::JobChangedDate));
    let recipients: Vec<&str> = emails.iter().map(|mail| mail.to.as_str()).collect();
    assert!(recipients.contains(&requester.email.as_str()));
    assert!(recipients.contains(&interpreter.email.as_str()));
    engine.gateway.clear().await;

    let outcome = engine
        .service
        .update_job(
            job.id,
            &operator,
            AdminEdit {
                due: Some(engine.now() - Duration::hours(1)),
                ..AdminEdit::default()
            },
        )
        .await?;
    assert!(!outcome.notified);
    assert_eq!(outcome.audit.len(), 1);
    assert!(engine.gateway.emails().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn language_change_is_audited_by_name() -> Result<()> {
    let engine = Engine::new().await;
    let requester = engine.add(customer("Kund")).await;
    let operator = engine.add(admin("Ops")).await;
    let job = engine.pending(&requester, Duration::hours(30)).await?;

    let outcome = engine
        .service
        .update_job(
            job.id,
            &operator,
            AdminEdit {
                from_language_id: Some(SOMALI),
                ..AdminEdit::default()
            },
        )
        .await?;
    assert_eq!(outcome.job.from_language_id, SOMALI);
    let entry = &outcome.audit[0];
    assert_eq!(entry.field, "language");
    assert_eq!(entry.old_value.as_deref(), Some("Arabic"));
    assert_eq!(entry.new_value.as_deref(), Some("Somali"));
    assert_eq!(engine.store.audit().await.len(), 1);

    let emails = engine.gateway.emails().await;
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].template, EmailTemplate::JobChangedLanguage);
    assert_eq!(emails[0].data["old_lang"], "Arabic");
    Ok(())
}

#[tokio::test]
async fn replacing_the_translator_swaps_the_open_assignment() -> Result<()> {
    let engine = Engine::new().await;
    let requester = engine.add(customer("Kund")).await;
    let first = engine.add(translator("Amina")).await;
    let second = engine.add(translator("Omar")).await;
    let operator = engine.add(admin("Ops")).await;
    let job = engine
        .assigned(&requester, &first, Duration::hours(48))
        .await?;
    engine.gateway.clear().await;

    let outcome = engine
        .service
        .update_job(
            job.id,
            &operator,
            AdminEdit {
                translator: Some(TranslatorRef::Id(second.id)),
                ..AdminEdit::default()
            },
        )
        .await?;
    assert_eq!(outcome.status, StatusChange::NotRequested);
    assert_eq!(outcome.audit[0].field, "translator");
    assert_eq!(outcome.audit[0].old_value.as_deref(), Some(first.email.as_str()));
    assert_eq!(outcome.audit[0].new_value.as_deref(), Some(second.email.as_str()));

    let history = engine.store.assignments_for(job.id).await;
    let open: Vec<_> = history.iter().filter(|row| row.is_open()).collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].translator_id, second.id);
    assert_eq!(engine.reload(job.id).await?.status, JobStatus::Assigned);

    let emails = engine.gateway.emails().await;
    let templates: Vec<(EmailTemplate, &str)> = emails
        .iter()
        .map(|mail| (mail.template, mail.to.as_str()))
        .collect();
    assert_eq!(
        templates,
        vec![
            (
                EmailTemplate::JobChangedTranslatorCustomer,
                requester.email.as_str()
            ),
            (
                EmailTemplate::JobChangedTranslatorOldTranslator,
                first.email.as_str()
            ),
            (
                EmailTemplate::JobChangedTranslatorNewTranslator,
                second.email.as_str()
            ),
        ]
    );

    // Naming the translator already on the job is not a change.
    let outcome = engine
        .service
        .update_job(
            job.id,
            &operator,
            AdminEdit {
                translator: Some(TranslatorRef::Id(second.id)),
                ..AdminEdit::default()
            },
        )
        .await?;
    assert!(outcome.audit.is_empty());
    assert_eq!(engine.store.assignments_for(job.id).await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn completed_jobs_cannot_be_restarted() -> Result<()> {
    let engine = Engine::new().await;
    let requester = engine.add(customer("Kund")).await;
    let interpreter = engine.add(translator("Amina")).await;
    let operator = engine.add(admin("Ops")).await;
    let job = engine
        .started(&requester, &interpreter, Duration::hours(2))
        .await?;
    engine.service.end_session(job.id, &interpreter).await?;

    let err = engine
        .service
        .change_status(job.id, &operator, JobStatus::Started, with_comment("oops"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidTransition {
            from: JobStatus::Completed,
            to: JobStatus::Started
        }
    ));
    Ok(())
}

#[tokio::test]
async fn late_withdrawal_can_be_timed_out_without_a_comment() -> Result<()> {
    let engine = Engine::new().await;
    let requester = engine.add(customer("Kund")).await;
    let operator = engine.add(admin("Ops")).await;
    let job = engine.pending(&requester, Duration::hours(10)).await?;
    engine.service.cancel_job(job.id, &requester).await?;

    let change = engine
        .service
        .change_status(job.id, &operator, JobStatus::Timedout, AdminEdit::default())
        .await?;
    assert_eq!(
        change,
        StatusChange::Changed {
            from: JobStatus::WithdrawAfter24,
            to: JobStatus::Timedout
        }
    );

    let pending = engine.pending(&requester, Duration::hours(30)).await?;
    let change = engine
        .service
        .change_status(pending.id, &operator, JobStatus::Timedout, AdminEdit::default())
        .await?;
    assert_eq!(
        change,
        StatusChange::NotChanged {
            field: "admin_comment"
        }
    );
    Ok(())
}

#[tokio::test]
async fn only_admins_edit_bookings() -> Result<()> {
    let engine = Engine::new().await;
    let requester = engine.add(customer("Kund")).await;
    let job = engine.pending(&requester, Duration::hours(30)).await?;

    let err = engine
        .service
        .update_job(job.id, &requester, with_comment("mine"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden(_)));
    Ok(())
}
