//! Error recovery and error propagation through producers.

mod common;

use common::{GetOutOfHereError, IllegalStateError, User, test_config};
use stepverify::sources::{Just, create, just};
use stepverify::{Observer, ProducerError, Scheduler, StepVerifier};

/// Substitutes Saul for a failed lookup.
fn better_call_saul(lookup: Result<User, ProducerError>) -> Just<User> {
    just([lookup.unwrap_or_else(|_| User::saul())])
}

/// Substitutes Saul and Jesse for a failed listing.
fn better_call_saul_and_jesse(listing: Result<Vec<User>, ProducerError>) -> Just<User> {
    match listing {
        Ok(users) => just(users),
        Err(_) => just([User::saul(), User::jesse()]),
    }
}

fn capitalize_user(user: &User) -> Result<User, GetOutOfHereError> {
    if *user == User::saul() {
        return Err(GetOutOfHereError);
    }
    Ok(user.capitalized())
}

#[test]
fn test_single_value_instead_of_error() {
    let failed = Err(ProducerError::of(&IllegalStateError));
    StepVerifier::create(better_call_saul(failed))
        .expect_next([User::saul()])
        .expect_complete()
        .verify_with(&test_config())
        .unwrap();

    StepVerifier::create(better_call_saul(Ok(User::skyler())))
        .expect_next([User::skyler()])
        .expect_complete()
        .verify_with(&test_config())
        .unwrap();
}

#[test]
fn test_many_values_instead_of_error() {
    let failed = Err(ProducerError::of(&IllegalStateError));
    StepVerifier::create(better_call_saul_and_jesse(failed))
        .expect_next([User::saul(), User::jesse()])
        .expect_complete()
        .verify_with(&test_config())
        .unwrap();

    let listed = Ok(vec![User::skyler(), User::walter()]);
    StepVerifier::create(better_call_saul_and_jesse(listed))
        .expect_next([User::skyler(), User::walter()])
        .expect_complete()
        .verify_with(&test_config())
        .unwrap();
}

#[test]
fn test_checked_error_fails_the_stream() {
    let users = vec![User::saul(), User::jesse()];
    let producer = create(move |observer: Observer<User>, _scheduler: &Scheduler| {
        for user in &users {
            match capitalize_user(user) {
                Ok(user) => {
                    if !observer.on_next(user) {
                        return;
                    }
                }
                Err(err) => {
                    observer.on_error(ProducerError::of(&err));
                    return;
                }
            }
        }
        observer.on_complete();
    });

    StepVerifier::create(producer)
        .expect_error_of::<GetOutOfHereError>()
        .verify_with(&test_config())
        .unwrap();
}

#[test]
fn test_error_after_values_is_matched_by_predicate() {
    let producer = just([User::skyler()]).concat_error(ProducerError::of(&IllegalStateError));

    StepVerifier::create(producer)
        .expect_next([User::skyler()])
        .expect_error_matching_described("illegal state", |err: &ProducerError| {
            err.is::<IllegalStateError>()
        })
        .verify_with(&test_config())
        .unwrap();
}

#[test]
fn test_error_source_with_explicit_kind() {
    StepVerifier::create(stepverify::sources::error::<User>(ProducerError::new(
        "IllegalState",
        "no such user",
    )))
    .expect_error("IllegalState")
    .verify_with(&test_config())
    .unwrap();
}
