//! Property-Based Tests for Amount Parsing and Form Gating
//!
//! Uses proptest to generate random inputs and verify the money-math and
//! submission-gate invariants hold.

use proptest::prelude::*;

use basalt_wallet::{
    validate, ContractScript, ExternalRequest, FormSessionState, MichelineExpr, Mutez,
    NetworkConstants, OperationDetail, OperationRequest, SelectedAccount, TransactionParams,
    KIND_ORIGINATION, MUTEZ_PER_TEZ,
};

// =============================================================================
// PROPTEST STRATEGIES
// =============================================================================

/// Strategy for decimal tez strings within the six-digit grammar
fn tez_string() -> impl Strategy<Value = String> {
    (1u64..10_000_000, 0u32..1_000_000).prop_map(|(whole, frac)| {
        if frac == 0 {
            whole.to_string()
        } else {
            let mut s = format!("{}.{:06}", whole, frac);
            while s.ends_with('0') {
                s.pop();
            }
            s
        }
    })
}

/// Strategy for strings that contain at least one non-amount character
fn junk_string() -> impl Strategy<Value = String> {
    "[a-z,+ -]{1,8}"
}

fn seeded_session() -> FormSessionState {
    let script = ContractScript {
        code: MichelineExpr::Seq(Vec::new()),
        storage: MichelineExpr::prim("Unit"),
    };
    let mut session = FormSessionState::new(NetworkConstants::default());
    session.intake(ExternalRequest {
        operation_request: OperationRequest {
            operation_details: vec![OperationDetail {
                kind: KIND_ORIGINATION.to_string(),
                balance: "1000000".to_string(),
                script: script.clone(),
                gas_limit: None,
                storage_limit: None,
            }],
        },
        selected_account: SelectedAccount {
            address: "tz1prop".to_string(),
            pkh: "tz1prop".to_string(),
            pk: "edpk-prop".to_string(),
            derivation_path: None,
        },
    });
    session.seed("1".to_string(), script);
    session
}

// =============================================================================
// MONEY MATH PROPERTY TESTS
// =============================================================================

proptest! {
    /// Property: formatting then parsing a micro-unit amount is lossless
    #[test]
    fn tez_string_round_trips(raw in 0u64..=u64::MAX / MUTEZ_PER_TEZ) {
        let amount = Mutez::new(raw);
        let rendered = amount.to_tez_string();
        prop_assert_eq!(Mutez::from_tez_str(&rendered).unwrap(), amount);
    }

    /// Property: every generated tez string parses and passes fee validation
    #[test]
    fn generated_tez_strings_are_valid_fees(value in tez_string()) {
        prop_assert!(validate::fee(&value));
        prop_assert!(Mutez::from_tez_str(&value).is_ok());
    }

    /// Property: strings with non-amount characters never validate
    #[test]
    fn junk_never_validates(value in junk_string()) {
        prop_assert!(!validate::amount(&value, 6));
        prop_assert!(!validate::gas(&value));
    }

    /// Property: integer strings validate as gas exactly when they are
    /// parseable digits
    #[test]
    fn gas_accepts_exactly_unsigned_integers(value in 0u64..=u64::MAX) {
        prop_assert!(validate::gas(&value.to_string()));
    }

    /// Property: saturating addition never wraps
    #[test]
    fn saturating_add_is_monotone(a in any::<u64>(), b in any::<u64>()) {
        let sum = Mutez::new(a).saturating_add(Mutez::new(b));
        prop_assert!(sum >= Mutez::new(a));
        prop_assert!(sum >= Mutez::new(b));
    }
}

// =============================================================================
// SUBMISSION GATE PROPERTY TESTS
// =============================================================================

proptest! {
    /// Property: the in-flight counter returns to zero under any mix of
    /// successful and failed completions
    #[test]
    fn estimation_counter_settles(results in prop::collection::vec(any::<bool>(), 1..16)) {
        let mut session = seeded_session();
        for _ in &results {
            session.begin_estimation();
        }
        for ok in &results {
            let result = if *ok {
                Ok(TransactionParams::zero())
            } else {
                Err("simulation failed".to_string())
            };
            session.finish_estimation(result);
        }
        prop_assert_eq!(session.sim_in_flight(), 0);
    }

    /// Property: reset wipes every override regardless of prior edits, and a
    /// second reset changes nothing
    #[test]
    fn reset_is_idempotent_under_any_overrides(
        fee in ".{0,12}",
        gas in ".{0,12}",
        storage in ".{0,12}",
    ) {
        let mut session = seeded_session();
        session.set_custom_fee(&fee);
        session.set_custom_gas(&gas);
        session.set_custom_storage(&storage);
        session.begin_estimation();
        session.reset();
        let once = format!("{:?}", session);
        session.reset();
        prop_assert_eq!(once, format!("{:?}", session));
        prop_assert_eq!(session.sim_in_flight(), 0);
        prop_assert_eq!(session.custom_fee(), "");
    }

    /// Property: with no simulation outstanding, the gate passes exactly when
    /// each override individually validates
    #[test]
    fn gate_matches_individual_validators(
        fee in prop_oneof![tez_string(), junk_string(), Just(String::new())],
        gas in prop_oneof!["[0-9]{1,6}", junk_string(), Just(String::new())],
        storage in prop_oneof!["[0-9]{1,6}", junk_string(), Just(String::new())],
    ) {
        let mut session = seeded_session();
        session.set_custom_fee(&fee);
        session.set_custom_gas(&gas);
        session.set_custom_storage(&storage);
        let expected = validate::gas(&gas) && validate::storage(&storage) && validate::fee(&fee);
        prop_assert_eq!(session.validate_for_submission(), expected);
    }
}
