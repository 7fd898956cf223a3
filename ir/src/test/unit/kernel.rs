use std::collections::BTreeMap;

use tally_poly::QPoly;

use crate::{ArrayDecl, AxisRole, DType, Error, Expr, Instruction, Kernel, MemScope};

fn copy_kernel(instructions: Vec<Instruction>) -> crate::Result<Kernel> {
    Kernel::builder()
        .name("copy")
        .domain("[n, m] -> { [i, j] : 0 <= i < n and 0 <= j < m }")
        .assumptions("n, m >= 1")
        .arrays(vec![
            ArrayDecl::global("a", DType::Float32, ["n", "m"]),
            ArrayDecl::global("b", DType::Float32, ["n", "m"]),
        ])
        .instructions(instructions)
        .build()
}

fn copy_insn() -> Instruction {
    let index = [Expr::var("i"), Expr::var("j")];
    Instruction::new("copy", Expr::subscript("b", index.clone()), Expr::subscript("a", index))
}

#[test]
fn test_build_infers_within() {
    let kernel = copy_kernel(vec![copy_insn()]).unwrap();
    assert_eq!(kernel.axes(), ["i", "j"]);
    assert_eq!(kernel.params().len(), 2);
    let insn = kernel.instruction("copy").unwrap();
    assert_eq!(insn.within_axes().collect::<Vec<_>>(), ["i", "j"]);
    assert_eq!(insn.assignee_name(), Some("b"));
    assert!(insn.read_names().contains("a"));
}

#[test]
fn test_explicit_within_is_kept() {
    let init = Instruction::new("init", Expr::var("acc"), 0).within(["i"]);
    let kernel = copy_kernel(vec![init]).unwrap();
    let insn = kernel.instruction("init").unwrap();
    assert!(insn.is_within("i"));
    assert!(!insn.is_within("j"));
}

#[test]
fn test_assumptions_restrict_domain() {
    let kernel = copy_kernel(vec![copy_insn()]).unwrap();
    // four bounds plus n >= 1 and m >= 1
    assert_eq!(kernel.domain().constraints().len(), 6);
}

#[test]
fn test_roles_and_tags() {
    let kernel = copy_kernel(vec![copy_insn()]).unwrap().tag("j", "l.0").unwrap().tag("i", "g.0").unwrap();
    assert_eq!(kernel.role("j"), AxisRole::Local(0));
    assert_eq!(kernel.local_axes(), [("j", 0)]);
    assert_eq!(kernel.group_axes(), [("i", 0)]);

    let err = copy_kernel(vec![copy_insn()]).unwrap().tag("k", "l.0").unwrap_err();
    assert_eq!(err, Error::UnknownAxis { name: "k".into() });

    let err = copy_kernel(vec![copy_insn()]).unwrap().tag("i", "lane").unwrap_err();
    assert!(matches!(err, Error::InvalidRole { .. }));
}

#[test]
fn test_roles_in_builder_are_validated() {
    let result = Kernel::builder()
        .name("k")
        .domain("[n] -> { [i] : 0 <= i < n }")
        .instructions(vec![])
        .roles(BTreeMap::from([("x".to_string(), AxisRole::Local(0))]))
        .build();
    assert_eq!(result.unwrap_err(), Error::UnknownAxis { name: "x".into() });
}

#[test]
fn test_validation_errors() {
    let undeclared = Instruction::new("u", Expr::subscript("c", [Expr::var("i")]), 1.0);
    assert_eq!(copy_kernel(vec![undeclared]).unwrap_err(), Error::UndeclaredArray { name: "c".into() });

    let err = copy_kernel(vec![copy_insn(), copy_insn()]).unwrap_err();
    assert_eq!(err, Error::DuplicateInstruction { id: "copy".into() });

    let err = copy_kernel(vec![copy_insn().depends_on(["missing"])]).unwrap_err();
    assert_eq!(err, Error::UnknownDependency { id: "copy".into(), dependency: "missing".into() });

    let err = copy_kernel(vec![copy_insn().within(["q"])]).unwrap_err();
    assert_eq!(err, Error::UnknownAxis { name: "q".into() });

    let reduce = Expr::reduce(crate::ReduceOp::Sum, ["k"], Expr::subscript("a", [Expr::var("i"), Expr::var("k")]));
    let err = copy_kernel(vec![Instruction::new("r", Expr::var("s"), reduce)]).unwrap_err();
    assert_eq!(err, Error::UnknownAxis { name: "k".into() });
}

#[test]
fn test_bad_domain() {
    let result = Kernel::builder().name("k").domain("{ [i] : 0 <= i <").instructions(vec![]).build();
    assert!(matches!(result, Err(Error::Domain { .. })));
}

#[test]
fn test_transitive_dependencies() {
    let a = Instruction::new("a", Expr::var("x"), 1);
    let b = Instruction::new("b", Expr::var("y"), Expr::var("x")).depends_on(["a"]);
    let c = Instruction::new("c", Expr::var("z"), Expr::var("y")).depends_on(["b"]);
    let kernel = copy_kernel(vec![a, b, c]).unwrap();
    let deps: Vec<_> = kernel.transitive_dependencies("c").into_iter().collect();
    assert_eq!(deps, ["a", "b"]);
    assert!(kernel.transitive_dependencies("a").is_empty());
}

#[test]
fn test_array_layout() {
    let array = ArrayDecl::global("a", DType::Float64, ["n", "m"]);
    assert_eq!(array.row_major_strides().as_slice(), [QPoly::param("m"), QPoly::one()]);
    assert_eq!(array.scope(), MemScope::Global);
    assert!(!array.is_temporary());

    let tile = ArrayDecl::local("tile", DType::Float32, [16i64, 16]);
    assert!(tile.is_temporary());
    assert_eq!(tile.row_major_strides().as_slice(), [QPoly::from(16), QPoly::one()]);

    let scalar = ArrayDecl::scalar("alpha", DType::Float32);
    assert!(scalar.is_scalar());
    assert!(scalar.row_major_strides().is_empty());
}
