use std::cell::RefCell;

use stagehand_core::transaction::{InstallationTransaction, Operation};
use tempfile::TempDir;

fn failing_at(k: usize, n: usize, log: &RefCell<Vec<String>>) -> InstallationTransaction<'_> {
    let mut tx = InstallationTransaction::new("rollback-grid");
    for i in 0..n {
        let op = Operation::new(
            format!("op{i}"),
            move || {
                if i == k {
                    anyhow::bail!("op{i} failed");
                }
                log.borrow_mut().push(format!("do op{i}"));
                Ok(())
            },
            move || {
                log.borrow_mut().push(format!("undo op{i}"));
                Ok(())
            },
        );
        if !tx.execute_operation(op) {
            break;
        }
    }
    tx
}

#[test]
fn every_failure_position_undoes_exactly_the_prefix() {
    let n = 5;
    for k in 0..n {
        let log = RefCell::new(Vec::new());
        let tx = failing_at(k, n, &log);
        let report = tx.report().clone();

        assert!(tx.is_poisoned());
        let expected_undo: Vec<String> = (0..k).rev().map(|i| format!("op{i}")).collect();
        assert_eq!(report.rolled_back, expected_undo, "failing at {k}");
        assert_eq!(report.executed.len(), k);
        assert_eq!(
            report.failure.as_ref().map(|f| f.operation.as_str()),
            Some(format!("op{k}").as_str())
        );
        assert!(report.is_clean_rollback());

        let undone = log
            .borrow()
            .iter()
            .filter(|entry| entry.starts_with("undo"))
            .count();
        assert_eq!(undone, k);
    }
}

#[test]
fn poisoned_transaction_refuses_more_work() {
    let log = RefCell::new(Vec::new());
    let ran = RefCell::new(false);
    let mut tx = failing_at(1, 3, &log);
    let accepted = tx.execute_operation(Operation::irreversible("late", || {
        *ran.borrow_mut() = true;
        Ok(())
    }));
    assert!(!accepted);
    assert!(!*ran.borrow());
}

#[test]
fn rollback_errors_are_collected_and_the_rest_still_runs() {
    let undone = RefCell::new(Vec::new());
    let mut tx = InstallationTransaction::new("partial");

    tx.execute_operation(Operation::new(
        "first",
        || Ok(()),
        || {
            undone.borrow_mut().push("first");
            Ok(())
        },
    ));
    tx.execute_operation(Operation::new(
        "second",
        || Ok(()),
        || anyhow::bail!("cannot undo second"),
    ));
    assert!(!tx.execute_operation(Operation::irreversible("third", || {
        anyhow::bail!("boom")
    })));

    let report = tx.report();
    assert_eq!(report.rolled_back, vec!["first".to_string()]);
    assert_eq!(report.rollback_errors.len(), 1);
    assert_eq!(report.rollback_errors[0].operation, "second");
    assert!(!report.is_clean_rollback());
    assert_eq!(*undone.borrow(), vec!["first"]);
}

#[test]
fn filesystem_operations_leave_no_trace_after_rollback() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("install");
    let file = dir.join("service.toml");

    let mut tx = InstallationTransaction::new("fs");
    tx.execute_operation(Operation::new(
        "create dir",
        || Ok(std::fs::create_dir_all(&dir)?),
        || Ok(std::fs::remove_dir_all(&dir)?),
    ));
    tx.execute_operation(Operation::new(
        "write file",
        || Ok(std::fs::write(&file, "port = 1\n")?),
        || Ok(std::fs::remove_file(&file)?),
    ));
    assert!(file.exists());

    assert!(!tx.execute_operation(Operation::irreversible("start", || {
        anyhow::bail!("service refused to start")
    })));
    assert!(!dir.exists());
}

#[test]
fn commit_keeps_the_work() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("kept");
    let mut tx = InstallationTransaction::new("commit");
    assert!(tx.execute_operation(Operation::new(
        "create dir",
        || Ok(std::fs::create_dir_all(&dir)?),
        || Ok(std::fs::remove_dir_all(&dir)?),
    )));
    assert_eq!(tx.committed_len(), 1);

    let report = tx.commit();
    assert_eq!(report.executed, vec!["create dir".to_string()]);
    assert!(report.rolled_back.is_empty());
    assert!(dir.exists());
}
