//! End-to-end stack transaction scenarios against real repositories.

mod common;

use common::{make_empty_patch_commit, make_patch_commit, setup_repo};
use strata::stack::{patch_ref, stack_ref};
use strata::{Error, PatchName, Stack, StackTransaction, TransactionOptions, TransactionOutcome};
use strata_git::{IndexAndWorktree, Repository, Worktree};

fn pn(name: &str) -> PatchName {
    name.parse().expect("valid patch name")
}

fn names(list: &[PatchName]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

/// Stage a list of fresh applied patches, one file per patch, and run.
fn build_applied(repo: &Repository, stack: &mut Stack<'_>, patches: &[(&str, &str, &str)]) {
    let mut parent = stack.branch_head().expect("head");
    let mut trans = StackTransaction::new(stack, "create patches", TransactionOptions::default())
        .expect("transaction");
    for (name, file, contents) in patches {
        let commit = make_patch_commit(repo, &parent, file, contents, name);
        trans
            .new_applied(&pn(name), commit.clone())
            .expect("new_applied");
        parent = commit;
    }
    trans.run(None).expect("run");
}

#[test]
fn empty_push_creates_no_commit() {
    let tr = setup_repo();
    let repo = tr.open();
    let mut stack = Stack::initialize(&repo, "main").unwrap();
    let c0 = stack.branch_head().unwrap();
    let p = pn("p");
    let cp = make_empty_patch_commit(&repo, &c0, "empty patch");

    let mut trans =
        StackTransaction::new(&mut stack, "new p", TransactionOptions::default()).unwrap();
    trans.new_unapplied(&p, cp.clone()).unwrap();
    trans.run(None).unwrap();

    let mut trans =
        StackTransaction::new(&mut stack, "push p", TransactionOptions::default()).unwrap();
    trans.push_patch(&p, None).unwrap();
    let outcome = trans.run(None).unwrap();
    assert_eq!(outcome, TransactionOutcome::Clean);

    assert_eq!(names(stack.applied()), ["p"]);
    let commit = stack.patch_commit(&p).unwrap().clone();
    assert_eq!(commit, cp, "unchanged push must not rewrite the commit");
    let data = commit.data(&repo).unwrap();
    assert_eq!(data.parent().unwrap(), &c0);
    assert_eq!(data.tree, c0.tree(&repo).unwrap());
    assert!(stack.head_top_equal().unwrap());
}

#[test]
fn push_reparents_and_merges_disjoint_trees() {
    let tr = setup_repo();
    let repo = tr.open();
    let mut stack = Stack::initialize(&repo, "main").unwrap();
    let c0 = stack.branch_head().unwrap();
    build_applied(&repo, &mut stack, &[("a", "a.txt", "a\n")]);
    let ca = stack.patch_commit(&pn("a")).unwrap().clone();

    // b is rooted at the old base, touching a disjoint path.
    let cb = make_patch_commit(&repo, &c0, "b.txt", "b\n", "b");
    let b = pn("b");
    let mut trans =
        StackTransaction::new(&mut stack, "new b", TransactionOptions::default()).unwrap();
    trans.new_unapplied(&b, cb.clone()).unwrap();
    trans.run(None).unwrap();

    let mut trans =
        StackTransaction::new(&mut stack, "push b", TransactionOptions::default()).unwrap();
    trans.push_patch(&b, None).unwrap();
    trans.run(None).unwrap();

    assert_eq!(names(stack.applied()), ["a", "b"]);
    assert_eq!(
        stack.patch_commit(&pn("a")).unwrap(),
        &ca,
        "the patch below is untouched"
    );
    let new_b = stack.patch_commit(&b).unwrap().clone();
    assert_ne!(new_b, cb, "reparenting rewrites the commit");
    let data = new_b.data(&repo).unwrap();
    assert_eq!(data.parent().unwrap(), &ca);
    let tree = data.tree.data(&repo).unwrap();
    assert!(tree.entry(b"a.txt").is_some(), "merge keeps ours");
    assert!(tree.entry(b"b.txt").is_some(), "merge keeps theirs");
    assert_eq!(stack.branch_head().unwrap(), new_b);
}

#[test]
fn conflicting_push_without_worktree_halts_and_changes_nothing() {
    let tr = setup_repo();
    let repo = tr.open();
    let mut stack = Stack::initialize(&repo, "main").unwrap();
    let c0 = stack.branch_head().unwrap();
    build_applied(&repo, &mut stack, &[("a", "f.txt", "ours\n")]);
    let ca = stack.patch_commit(&pn("a")).unwrap().clone();

    let cb = make_patch_commit(&repo, &c0, "f.txt", "theirs\n", "b");
    let b = pn("b");
    let mut trans =
        StackTransaction::new(&mut stack, "new b", TransactionOptions::default()).unwrap();
    trans.new_unapplied(&b, cb.clone()).unwrap();
    trans.run(None).unwrap();

    let mut trans =
        StackTransaction::new(&mut stack, "push b", TransactionOptions::default()).unwrap();
    let err = trans.push_patch(&b, None).unwrap_err();
    assert!(err.is_halt());
    assert!(err.to_string().contains("does not apply cleanly"));
    drop(trans); // walk away without running

    let reloaded = Stack::open(&repo, "main").unwrap();
    assert_eq!(names(reloaded.applied()), ["a"]);
    assert_eq!(names(reloaded.unapplied()), ["b"]);
    assert_eq!(reloaded.patch_commit(&b).unwrap(), &cb);
    assert_eq!(reloaded.branch_head().unwrap(), ca);
}

#[test]
fn conflicting_push_with_worktree_spills_and_records() {
    let tr = setup_repo();
    let repo = tr.open();
    let mut stack = Stack::initialize(&repo, "main").unwrap();
    let c0 = stack.branch_head().unwrap();
    build_applied(&repo, &mut stack, &[("a", "f.txt", "ours\n")]);
    let ca = stack.patch_commit(&pn("a")).unwrap().clone();
    let ta = ca.tree(&repo).unwrap();

    let cb = make_patch_commit(&repo, &c0, "f.txt", "theirs\n", "b");
    let b = pn("b");
    let mut trans =
        StackTransaction::new(&mut stack, "new b", TransactionOptions::default()).unwrap();
    trans.new_unapplied(&b, cb.clone()).unwrap();
    trans.run(None).unwrap();

    // Bring index and worktree up to the branch head before working on it.
    tr.git(&["read-tree", "--reset", "-u", ta.oid().as_str()]);
    let mut iw = IndexAndWorktree::new(repo.default_index(), Worktree::new(tr.workdir()));

    let mut trans =
        StackTransaction::new(&mut stack, "push b", TransactionOptions::default()).unwrap();
    let err = trans.push_patch(&b, Some(&mut iw)).unwrap_err();
    assert!(err.is_halt());
    assert_eq!(err.to_string(), "Merge conflict");

    let outcome = trans.run(Some(&mut iw)).unwrap();
    assert_eq!(outcome, TransactionOutcome::Conflict);

    // The conflicted patch is recorded as applied with the pre-merge tree;
    // the conflicts live in the worktree, not the committed tree.
    assert_eq!(names(stack.applied()), ["a", "b"]);
    let recorded = stack.patch_commit(&b).unwrap().clone();
    let data = recorded.data(&repo).unwrap();
    assert_eq!(data.tree, ta);
    assert_eq!(data.parent().unwrap(), &ca);
    assert_eq!(stack.branch_head().unwrap(), recorded);

    let worktree_file = tr.read_file("f.txt");
    assert!(
        worktree_file.contains("<<<<<<<"),
        "conflict markers in the worktree: {worktree_file:?}"
    );
    assert!(!iw.index().conflicts().unwrap().is_empty());

    // The audit log records the conflicted pass.
    let log_head = repo.refs().get(&stack_ref("main")).unwrap();
    let log_msg = repo
        .get_commit(&log_head)
        .data(&repo)
        .unwrap()
        .message
        .clone();
    assert_eq!(log_msg, "push b (CONFLICT)\n");
}

#[test]
fn pop_then_push_is_identity() {
    let tr = setup_repo();
    let repo = tr.open();
    let mut stack = Stack::initialize(&repo, "main").unwrap();
    build_applied(
        &repo,
        &mut stack,
        &[
            ("a", "a.txt", "a\n"),
            ("b", "b.txt", "b\n"),
            ("c", "c.txt", "c\n"),
        ],
    );
    let originals: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|n| stack.patch_commit(&pn(n)).unwrap().clone())
        .collect();

    let b = pn("b");
    let mut trans =
        StackTransaction::new(&mut stack, "pop and repush", TransactionOptions::default())
            .unwrap();
    let incidental = trans.pop_patches(|x| *x == b);
    assert_eq!(names(&incidental), ["c"]);
    assert_eq!(names(trans.applied()), ["a"]);
    assert_eq!(names(trans.unapplied()), ["c", "b"]);

    trans.push_patch(&b, None).unwrap();
    trans.push_patch(&pn("c"), None).unwrap();
    assert_eq!(names(trans.applied()), ["a", "b", "c"]);
    trans.run(None).unwrap();

    for (name, original) in ["a", "b", "c"].iter().zip(&originals) {
        assert_eq!(
            stack.patch_commit(&pn(name)).unwrap(),
            original,
            "push after pop restores `{name}` without rewriting"
        );
    }
    assert!(stack.head_top_equal().unwrap());
}

#[test]
fn reorder_rewrites_only_past_the_common_prefix() {
    let tr = setup_repo();
    let repo = tr.open();
    let mut stack = Stack::initialize(&repo, "main").unwrap();
    let c0 = stack.branch_head().unwrap();
    build_applied(
        &repo,
        &mut stack,
        &[
            ("a", "a.txt", "a\n"),
            ("b", "b.txt", "b\n"),
            ("c", "c.txt", "c\n"),
        ],
    );
    let ca = stack.patch_commit(&pn("a")).unwrap().clone();
    let cb = stack.patch_commit(&pn("b")).unwrap().clone();
    let cc = stack.patch_commit(&pn("c")).unwrap().clone();

    let cd = make_patch_commit(&repo, &c0, "d.txt", "d\n", "d");
    let d = pn("d");
    let mut trans =
        StackTransaction::new(&mut stack, "new d", TransactionOptions::default()).unwrap();
    trans.new_unapplied(&d, cd.clone()).unwrap();
    trans.run(None).unwrap();

    let mut trans =
        StackTransaction::new(&mut stack, "reorder", TransactionOptions::default()).unwrap();
    trans
        .reorder_patches(
            &[pn("a"), pn("b"), pn("d")],
            &[pn("c")],
            &[],
            None,
        )
        .unwrap();
    trans.run(None).unwrap();

    assert_eq!(names(stack.applied()), ["a", "b", "d"]);
    assert_eq!(names(stack.unapplied()), ["c"]);
    assert_eq!(stack.patch_commit(&pn("a")).unwrap(), &ca);
    assert_eq!(stack.patch_commit(&pn("b")).unwrap(), &cb);
    assert_eq!(
        stack.patch_commit(&pn("c")).unwrap(),
        &cc,
        "popping must not rewrite"
    );
    let new_d = stack.patch_commit(&d).unwrap().clone();
    assert_ne!(new_d, cd);
    let data = new_d.data(&repo).unwrap();
    assert_eq!(data.parent().unwrap(), &cb);
    let tree = data.tree.data(&repo).unwrap();
    for file in [b"a.txt".as_slice(), b"b.txt", b"d.txt"] {
        assert!(tree.entry(file).is_some());
    }
    assert!(tree.entry(b"c.txt").is_none());
}

#[test]
fn reorder_can_hide_and_push_can_unhide() {
    let tr = setup_repo();
    let repo = tr.open();
    let mut stack = Stack::initialize(&repo, "main").unwrap();
    let c0 = stack.branch_head().unwrap();
    build_applied(&repo, &mut stack, &[("a", "a.txt", "a\n")]);
    let cb = make_patch_commit(&repo, &c0, "b.txt", "b\n", "b");
    let cc = make_patch_commit(&repo, &c0, "c.txt", "c\n", "c");

    let mut trans =
        StackTransaction::new(&mut stack, "new b c", TransactionOptions::default()).unwrap();
    trans.new_unapplied(&pn("c"), cc).unwrap();
    trans.new_unapplied(&pn("b"), cb).unwrap();
    trans.run(None).unwrap();

    let mut trans =
        StackTransaction::new(&mut stack, "hide c", TransactionOptions::default()).unwrap();
    trans
        .reorder_patches(&[pn("a")], &[pn("b")], &[pn("c")], None)
        .unwrap();
    trans.run(None).unwrap();
    assert_eq!(names(stack.hidden()), ["c"]);

    let mut trans =
        StackTransaction::new(&mut stack, "push c", TransactionOptions::default()).unwrap();
    trans.push_patch(&pn("c"), None).unwrap();
    trans.run(None).unwrap();
    assert_eq!(names(stack.applied()), ["a", "c"]);
    assert!(stack.hidden().is_empty());
    assert_eq!(names(stack.unapplied()), ["b"]);
}

#[test]
fn head_divergence_refuses_transactions() {
    let tr = setup_repo();
    let repo = tr.open();
    let mut stack = Stack::initialize(&repo, "main").unwrap();
    build_applied(&repo, &mut stack, &[("a", "a.txt", "a\n")]);
    drop(stack);

    // Plain git moves the branch underneath the stack.
    tr.write_file("external.txt", "external\n");
    tr.git(&["add", "external.txt"]);
    tr.git(&["commit", "-q", "-m", "external commit"]);

    let repo = tr.open();
    let mut stack = Stack::open(&repo, "main").unwrap();
    let err =
        StackTransaction::new(&mut stack, "doomed", TransactionOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Transaction { .. }));
    assert!(err.to_string().contains("HEAD and stack top"));
    assert_eq!(names(stack.applied()), ["a"], "stack is untouched");

    // Repair tooling may opt in.
    let allow = TransactionOptions {
        allow_bad_head: true,
        ..TransactionOptions::default()
    };
    assert!(StackTransaction::new(&mut stack, "repair", allow).is_ok());
}

#[test]
fn pop_with_never_matching_predicate_is_noop() {
    let tr = setup_repo();
    let repo = tr.open();
    let mut stack = Stack::initialize(&repo, "main").unwrap();
    build_applied(&repo, &mut stack, &[("a", "a.txt", "a\n")]);

    let mut trans =
        StackTransaction::new(&mut stack, "noop", TransactionOptions::default()).unwrap();
    let incidental = trans.pop_patches(|_| false);
    assert!(incidental.is_empty());
    assert_eq!(names(trans.applied()), ["a"]);
    assert!(trans.unapplied().is_empty());
    trans.run(None).unwrap();
    assert_eq!(names(stack.applied()), ["a"]);
}

#[test]
fn deleting_everything_returns_to_base() {
    let tr = setup_repo();
    let repo = tr.open();
    let mut stack = Stack::initialize(&repo, "main").unwrap();
    let c0 = stack.branch_head().unwrap();
    build_applied(
        &repo,
        &mut stack,
        &[("a", "a.txt", "a\n"), ("b", "b.txt", "b\n")],
    );

    let mut trans =
        StackTransaction::new(&mut stack, "delete all", TransactionOptions::default()).unwrap();
    let incidental = trans.delete_patches(|_| true, false).unwrap();
    assert!(incidental.is_empty());
    trans.run(None).unwrap();

    assert!(stack.applied().is_empty());
    assert!(stack.unapplied().is_empty());
    assert!(stack.hidden().is_empty());
    assert_eq!(stack.branch_head().unwrap(), c0);
    assert_eq!(stack.base().unwrap(), c0);
    for name in ["a", "b"] {
        assert!(!repo.refs().exists(&patch_ref("main", &pn(name))).unwrap());
    }
}

#[test]
fn dropped_transaction_changes_nothing() {
    let tr = setup_repo();
    let repo = tr.open();
    let mut stack = Stack::initialize(&repo, "main").unwrap();
    let c0 = stack.branch_head().unwrap();
    build_applied(&repo, &mut stack, &[("a", "a.txt", "a\n")]);
    let ca = stack.patch_commit(&pn("a")).unwrap().clone();
    let cb = make_patch_commit(&repo, &c0, "b.txt", "b\n", "b");

    let mut trans =
        StackTransaction::new(&mut stack, "new b", TransactionOptions::default()).unwrap();
    trans.new_unapplied(&pn("b"), cb).unwrap();
    trans.run(None).unwrap();

    let mut trans =
        StackTransaction::new(&mut stack, "abandoned", TransactionOptions::default()).unwrap();
    trans.push_patch(&pn("b"), None).unwrap();
    assert_eq!(names(trans.applied()), ["a", "b"]);
    drop(trans); // no run(): nothing may change on disk

    let reloaded = Stack::open(&repo, "main").unwrap();
    assert_eq!(names(reloaded.applied()), ["a"]);
    assert_eq!(names(reloaded.unapplied()), ["b"]);
    assert_eq!(reloaded.branch_head().unwrap(), ca);
}

#[test]
fn update_patch_repoints_and_persists() {
    let tr = setup_repo();
    let repo = tr.open();
    let mut stack = Stack::initialize(&repo, "main").unwrap();
    let c0 = stack.branch_head().unwrap();
    build_applied(&repo, &mut stack, &[("a", "a.txt", "a\n")]);

    let refreshed = make_patch_commit(&repo, &c0, "a.txt", "a v2\n", "a");
    let mut trans =
        StackTransaction::new(&mut stack, "refresh a", TransactionOptions::default()).unwrap();
    trans.update_patch(&pn("a"), refreshed.clone()).unwrap();
    trans.run(None).unwrap();

    assert_eq!(stack.patch_commit(&pn("a")).unwrap(), &refreshed);
    assert_eq!(stack.branch_head().unwrap(), refreshed);
    let ref_oid = repo.refs().get(&patch_ref("main", &pn("a"))).unwrap();
    assert_eq!(&ref_oid, refreshed.oid());
}
