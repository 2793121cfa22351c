//! Origination pipeline benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use basalt_wallet::{
    validate, ContractScript, ExternalRequest, FormSessionState, MichelineExpr, Mutez,
    NetworkConstants, OperationDetail, OperationRequest, SelectedAccount, TransactionParams,
    KIND_ORIGINATION,
};

fn seeded_session() -> FormSessionState {
    let script = ContractScript {
        code: MichelineExpr::Seq(vec![MichelineExpr::prim("parameter")]),
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
            address: "tz1bench".to_string(),
            pkh: "tz1bench".to_string(),
            pk: "edpk-bench".to_string(),
            derivation_path: None,
        },
    });
    session.seed("1".to_string(), script);
    session.begin_estimation();
    session.finish_estimation(Ok(TransactionParams {
        gas: 10_600,
        storage: 570,
        fee: Mutez::new(1_420),
        burn: Mutez::new(142_500),
    }));
    session
}

fn bench_tez_parsing(c: &mut Criterion) {
    c.bench_function("mutez_from_tez_str", |b| {
        b.iter(|| {
            let _ = Mutez::from_tez_str(black_box("1234.567891"));
        });
    });
}

fn bench_tez_formatting(c: &mut Criterion) {
    let amount = Mutez::new(1_234_567_891);
    c.bench_function("mutez_to_tez_string", |b| {
        b.iter(|| {
            let _ = black_box(amount).to_tez_string();
        });
    });
}

fn bench_amount_validation(c: &mut Criterion) {
    c.bench_function("validate_amount", |b| {
        b.iter(|| {
            let _ = validate::amount(black_box("10.123456"), black_box(6));
        });
    });
}

fn bench_submission_gate(c: &mut Criterion) {
    let mut session = seeded_session();
    session.set_custom_fee("0.002");
    session.set_custom_gas("12000");

    c.bench_function("validate_for_submission", |b| {
        b.iter(|| {
            let _ = black_box(&mut session).validate_for_submission();
        });
    });
}

fn bench_cost_calculation(c: &mut Criterion) {
    let mut session = seeded_session();
    session.set_custom_storage("570");

    c.bench_function("total_cost_display", |b| {
        b.iter(|| {
            let _ = black_box(&session).total_cost_display();
        });
    });
}

fn bench_payload_build(c: &mut Criterion) {
    let session = seeded_session();

    c.bench_function("build_origination", |b| {
        b.iter(|| {
            let _ = black_box(&session).build_origination();
        });
    });
}

criterion_group!(
    benches,
    bench_tez_parsing,
    bench_tez_formatting,
    bench_amount_validation,
    bench_submission_gate,
    bench_cost_calculation,
    bench_payload_build,
);
criterion_main!(benches);
