// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for the secret redactor.

use crate::redact::{Redactor, MASK};
use std::collections::HashMap;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn masks_recognised_env_values() {
    let redactor = Redactor::with_env(&env(&[
        ("OPENAI_API_KEY", "sk-live-12345"),
        ("HOME", "/home/op"),
    ]));
    let out = redactor.redact("key is sk-live-12345, home is /home/op", &[]);
    assert_eq!(out, format!("key is {}, home is /home/op", MASK));
}

#[test]
fn unrecognised_env_names_are_not_collected() {
    let redactor = Redactor::with_env(&env(&[("MY_VAR", "hunter2")]));
    assert!(redactor.is_empty());
    assert_eq!(redactor.redact("hunter2", &[]), "hunter2");
}

#[test]
fn empty_values_are_ignored() {
    let redactor = Redactor::with_env(&env(&[("GITHUB_TOKEN", "")]));
    assert!(redactor.is_empty());
    assert_eq!(redactor.redact("text unchanged", &[""]), "text unchanged");
}

#[test]
fn longest_value_masked_first() {
    // "abc" is a prefix of "abcdef"; masking "abc" first would leave "***def"
    let mut redactor = Redactor::new();
    redactor.add_value("abc");
    redactor.add_value("abcdef");
    let out = redactor.redact("token=abcdef other=abc", &[]);
    assert_eq!(out, format!("token={} other={}", MASK, MASK));
}

#[test]
fn replacement_is_case_sensitive() {
    let mut redactor = Redactor::new();
    redactor.add_value("Secret");
    assert_eq!(redactor.redact("Secret secret SECRET", &[]), format!("{} secret SECRET", MASK));
}

#[test]
fn extra_values_apply_per_call() {
    let redactor = Redactor::new();
    let out = redactor.redact("pw=ephemeral", &["ephemeral"]);
    assert_eq!(out, format!("pw={}", MASK));
    // not retained
    assert_eq!(redactor.redact("pw=ephemeral", &[]), "pw=ephemeral");
}

#[test]
fn redaction_is_idempotent() {
    let mut redactor = Redactor::new();
    redactor.add_value("tok-777");
    let once = redactor.redact("value tok-777 end", &[]);
    let twice = redactor.redact(&once, &[]);
    assert_eq!(once, twice);
}

#[test]
fn surrounding_structure_is_preserved() {
    let mut redactor = Redactor::new();
    redactor.add_value("s3cr3t");
    let out = redactor.redact("{\"auth\":\"s3cr3t\",\"n\":1}", &[]);
    assert_eq!(out, format!("{{\"auth\":\"{}\",\"n\":1}}", MASK));
}

#[test]
fn every_occurrence_is_replaced() {
    let mut redactor = Redactor::new();
    redactor.add_value("dup");
    assert_eq!(redactor.redact("dup dup dup", &[]), format!("{m} {m} {m}", m = MASK));
}

#[test]
fn redact_env_masks_credential_slots() {
    let redactor = Redactor::with_env(&env(&[("GH_TOKEN", "ghp_abc")]));
    let out = redactor.redact_env(&env(&[("GH_TOKEN", "ghp_abc"), ("PATH", "/usr/bin")]));
    assert!(out.contains(&("GH_TOKEN".to_string(), MASK.to_string())));
    assert!(out.contains(&("PATH".to_string(), "/usr/bin".to_string())));
}

#[test]
fn redact_env_masks_leaked_values_under_other_keys() {
    let mut redactor = Redactor::new();
    redactor.add_value("leaky");
    let out = redactor.redact_env(&env(&[("ARGS", "--token leaky")]));
    assert!(out.contains(&("ARGS".to_string(), format!("--token {}", MASK))));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// A known secret value never survives redaction.
        #[test]
        fn secret_never_survives(
            prefix in "[a-z ]{0,20}",
            secret in "[A-Za-z0-9_-]{4,32}",
            suffix in "[a-z ]{0,20}",
        ) {
            let mut redactor = Redactor::new();
            redactor.add_value(secret.clone());
            let text = format!("{prefix}{secret}{suffix}");
            let out = redactor.redact(&text, &[]);
            // The mask itself cannot recreate the secret because the secret
            // alphabet excludes '*'.
            prop_assert!(!out.contains(&secret));
        }

        /// Redaction with no matching value is the identity.
        #[test]
        fn no_match_is_identity(text in "[a-z ]{0,64}") {
            let mut redactor = Redactor::new();
            redactor.add_value("ZZZZ-not-in-alphabet");
            prop_assert_eq!(redactor.redact(&text, &[]), text);
        }
    }
}
