//! Kernels shared by the unit tests.

use tally_dtype::DType;
use tally_ir::{ArrayDecl, Expr, Instruction, Kernel, ReduceOp};
use tally_poly::{CardinalityMode, QPoly};

use crate::{CountingPolicy, SubgroupSize};

pub const N: i64 = 512;
pub const M: i64 = 256;
pub const ELL: i64 = 128;
pub const PARAMS: [(&str, i64); 3] = [("n", N), ("m", M), ("ell", ELL)];

const BOX: &str = "[n, m, ell] -> { [i, k, j] : 0 <= i < n and 0 <= k < m and 0 <= j < ell }";

pub fn var(name: &str) -> Expr {
    Expr::var(name)
}

pub fn at<E: Into<Expr>>(array: &str, index: impl IntoIterator<Item = E>) -> Expr {
    Expr::subscript(array, index)
}

fn ijk() -> [Expr; 3] {
    [var("i"), var("j"), var("k")]
}

fn ik() -> [Expr; 2] {
    [var("i"), var("k")]
}

fn ik1() -> [Expr; 2] {
    [var("i"), var("k") + 1]
}

/// Policy counting every replica, with a fixed subgroup size and exact counts.
pub fn redundant() -> CountingPolicy {
    CountingPolicy::builder()
        .count_redundant_work(true)
        .subgroup_size(SubgroupSize::fixed(32).unwrap())
        .cardinality(CardinalityMode::Exact)
        .build()
}

/// `a`, `b`, `c` of shape `(n, ell, m)` and `g`, `h`, `e` of shape `(n, m)`.
fn operands(single: DType, double: DType) -> Vec<ArrayDecl> {
    let cube = ["n", "ell", "m"];
    vec![
        ArrayDecl::global("a", single, cube),
        ArrayDecl::global("b", single, cube),
        ArrayDecl::global("c", single, cube),
        ArrayDecl::global("g", double, ["n", "m"]),
        ArrayDecl::global("h", double, ["n", "m"]),
        ArrayDecl::global("e", double, ["n", "m"]),
    ]
}

fn box_kernel(name: &str, arrays: Vec<ArrayDecl>, instructions: Vec<Instruction>) -> Kernel {
    Kernel::builder()
        .name(name)
        .domain(BOX)
        .assumptions("n, m, ell >= 1")
        .arrays(arrays)
        .instructions(instructions)
        .build()
        .unwrap()
}

/// ```text
/// c[i, j, k] = a[i, j, k] * b[i, j, k] / 3.0 + a[i, j, k]
/// e[i, k + 1] = -g[i, k] * h[i, k + 1]
/// ```
pub fn basic() -> Kernel {
    box_kernel(
        "basic",
        operands(DType::Float32, DType::Float64),
        vec![
            Instruction::new("first", at("c", ijk()), at("a", ijk()) * at("b", ijk()) / 3.0 + at("a", ijk())),
            Instruction::new("second", at("e", ik1()), -at("g", ik()) * at("h", ik1())),
        ],
    )
}

/// `c[i, j] = sum(k, a[i, k] * b[k, j])`
pub fn reduction() -> Kernel {
    let body = at("a", [var("i"), var("k")]) * at("b", [var("k"), var("j")]);
    box_kernel(
        "matmul_serial",
        vec![
            ArrayDecl::global("a", DType::Float32, ["n", "m"]),
            ArrayDecl::global("b", DType::Float32, ["m", "ell"]),
            ArrayDecl::global("c", DType::Float32, ["n", "ell"]),
        ],
        vec![Instruction::new("matmul", at("c", [var("i"), var("j")]), Expr::reduce(ReduceOp::Sum, ["k"], body))],
    )
}

/// `e[i, k] = if(not(k < ell - 2) and k > 6 or k / 2 == ell, g[i, k] * 2, g[i, k] + h[i, k] / 2)`
pub fn logic() -> Kernel {
    let condition = var("k")
        .less_than(var("ell") - 2)
        .logical_not()
        .logical_and(var("k").greater_than(6))
        .logical_or((var("k") / 2).equal_to(var("ell")));
    let expr = Expr::if_then_else(condition, at("g", ik()) * 2, at("g", ik()) + at("h", ik()) / 2);
    box_kernel(
        "logic",
        vec![
            ArrayDecl::global("g", DType::Float32, ["n", "m"]),
            ArrayDecl::global("h", DType::Float64, ["n", "m"]),
            ArrayDecl::global("e", DType::Float64, ["n", "m"]),
        ],
        vec![Instruction::new("logic", at("e", ik()), expr)],
    )
}

/// ```text
/// c[i, j, k] = (2 * a[i, j, k]) % (2 + b[i, j, k] / 3.0)
/// e[i, k] = (1 + g[i, k]) ** (1 + h[i, k + 1]) + rsqrt(g[i, k]) * sin(g[i, k])
/// ```
pub fn specialops() -> Kernel {
    let first = (Expr::int(2) * at("a", ijk())) % (Expr::int(2) + at("b", ijk()) / 3.0);
    let second = (Expr::int(1) + at("g", ik())).pow(Expr::int(1) + at("h", ik1()))
        + Expr::call("rsqrt", [at("g", ik())]) * Expr::call("sin", [at("g", ik())]);
    box_kernel(
        "specialops",
        operands(DType::Float32, DType::Float64),
        vec![Instruction::new("first", at("c", ijk()), first), Instruction::new("second", at("e", ik()), second)],
    )
}

/// ```text
/// c[i, j, k] = (a[i, j, k] | 1) + (b[i, j, k] & 1)
/// e[i, k] = (g[i, k] ^ k) * (~h[i, k + 1]) + (g[i, k] << (h[i, k] >> k))
/// ```
pub fn bitwise(wide: DType) -> Kernel {
    let first = (at("a", ijk()) | 1) + (at("b", ijk()) & 1);
    let second =
        (at("g", ik()) ^ var("k")) * !at("h", ik1()) + (at("g", ik()) << (at("h", ik()) >> var("k")));
    box_kernel(
        "bitwise",
        operands(DType::Int32, wide),
        vec![Instruction::new("first", at("c", ijk()), first), Instruction::new("second", at("e", ik()), second)],
    )
}

/// `a[i, j] = b[i, j] * 2` over `i < j`.
pub fn triangular() -> Kernel {
    let ij = || [var("i"), var("j")];
    Kernel::builder()
        .name("triangular")
        .domain("[n, m] -> { [i, j] : 0 <= i < n and 0 <= j < m and i < j }")
        .assumptions("n, m >= 1")
        .arrays(vec![
            ArrayDecl::global("a", DType::Float64, ["n", "m"]),
            ArrayDecl::global("b", DType::Float64, ["n", "m"]),
        ])
        .instructions(vec![Instruction::new("scale", at("a", ij()), at("b", ij()) * 2)])
        .build()
        .unwrap()
}

/// ```text
/// c[i, j, k] = a[i, j, k] * b[i, j, k] / 3.0 + a[i, j, k]
/// e[i, k] = g[i, k] * (2 + h[i, k])
/// ```
/// with `k` local, `i` and `j` group axes.
pub fn consecutive() -> Kernel {
    box_kernel(
        "consec",
        operands(DType::Float32, DType::Float64),
        vec![
            Instruction::new("first", at("c", ijk()), at("a", ijk()) * at("b", ijk()) / 3.0 + at("a", ijk())),
            Instruction::new("second", at("e", ik()), at("g", ik()) * (Expr::int(2) + at("h", ik()))),
        ],
    )
    .tag("k", "l.0")
    .unwrap()
    .tag("i", "g.0")
    .unwrap()
    .tag("j", "g.1")
    .unwrap()
}

/// `j` split by 65 into a local and a group axis; `x` is uniform across `j`.
pub fn mixed() -> Kernel {
    let j = var("j_out") * 65 + var("j_in");
    let cube = || [var("i"), j.clone(), var("k")];
    let mut arrays = operands(DType::Float32, DType::Float64);
    arrays.push(ArrayDecl::global("x", DType::Float32, ["n", "m"]));
    Kernel::builder()
        .name("mixed")
        .domain("[n, m, ell] -> { [i, k, j_out, j_in] : 0 <= i < n and 0 <= k < m and 0 <= j_in < 65 and 0 <= 65*j_out + j_in < ell }")
        .assumptions("n, m, ell >= 1")
        .arrays(arrays)
        .instructions(vec![
            Instruction::new(
                "first",
                at("c", cube()),
                at("a", cube()) * at("b", cube()) / 3.0 + at("a", cube()) + at("x", ik()),
            ),
            Instruction::new("second", at("e", ik()), at("g", ik()) * (Expr::int(2) + at("h", ik()))),
        ])
        .build()
        .unwrap()
        .tag("j_in", "l.0")
        .unwrap()
        .tag("j_out", "g.0")
        .unwrap()
}

/// A local temporary written at `k` and read at `k - 1` and `k + 1`, with `k`
/// split by 128 and its inner part local.
pub fn neighbours() -> Kernel {
    let k = var("k_out") * 128 + var("k_in");
    let at_k = |offset: i64| [var("i"), var("j"), if offset == 0 { k.clone() } else { k.clone() + offset }];
    Kernel::builder()
        .name("weird2")
        .domain("{ [i, j, k_out, k_in] : 0 <= i < 50 and 0 <= j < 10 and 0 <= k_in < 128 and 1 <= 128*k_out + k_in < 98 }")
        .arrays(vec![
            ArrayDecl::global("a", DType::Int32, [50i64, 10, 98]),
            ArrayDecl::global("e", DType::Int32, [50i64, 10, 98]),
            ArrayDecl::local("c", DType::Int32, [50i64, 10, 99]),
        ])
        .instructions(vec![
            Instruction::new("first", at("c", at_k(0)), Expr::int(2) * at("a", at_k(0))),
            Instruction::new("second", at("e", at_k(0)), at("c", at_k(1)) + at("c", at_k(-1))).depends_on(["first"]),
        ])
        .build()
        .unwrap()
        .tag("k_in", "l.0")
        .unwrap()
}

/// Tiled matrix product: 16x16 tiles of `a` and `b` are prefetched into local
/// memory once per `k_out` step.
pub fn tiled_matmul() -> Kernel {
    let row = var("i_out") * 16 + var("i_in");
    let col = var("j_out") * 16 + var("j_in");
    let fetch_axes = ["i_out", "i_in", "j_out", "j_in", "k_out"];
    let body = at("a_fetch", [var("i_in"), var("k_in")]) * at("b_fetch", [var("k_in"), var("j_in")]);
    Kernel::builder()
        .name("matmul")
        .domain(
            "[n, m, ell] -> { [i_out, i_in, j_out, j_in, k_out, k_in] : \
             0 <= i_in < 16 and 0 <= 16*i_out + i_in < n and \
             0 <= j_in < 16 and 0 <= 16*j_out + j_in < ell and \
             0 <= k_in < 16 and 0 <= 16*k_out + k_in < m }",
        )
        .assumptions("n, m, ell >= 1")
        .arrays(vec![
            ArrayDecl::global("a", DType::Float32, ["n", "m"]),
            ArrayDecl::global("b", DType::Float32, ["m", "ell"]),
            ArrayDecl::global("c", DType::Float32, ["n", "ell"]),
            ArrayDecl::local("a_fetch", DType::Float32, [16i64, 16]),
            ArrayDecl::local("b_fetch", DType::Float32, [16i64, 16]),
        ])
        .instructions(vec![
            Instruction::new(
                "a_fetch",
                at("a_fetch", [var("i_in"), var("j_in")]),
                at("a", [row.clone(), var("k_out") * 16 + var("j_in")]),
            )
            .within(fetch_axes),
            Instruction::new(
                "b_fetch",
                at("b_fetch", [var("i_in"), var("j_in")]),
                at("b", [var("k_out") * 16 + var("i_in"), col.clone()]),
            )
            .within(fetch_axes),
            Instruction::new("compute", at("c", [row, col]), Expr::reduce(ReduceOp::Sum, ["k_out", "k_in"], body))
                .depends_on(["a_fetch", "b_fetch"]),
        ])
        .build()
        .unwrap()
        .tag("i_out", "g.0")
        .unwrap()
        .tag("i_in", "l.1")
        .unwrap()
        .tag("j_out", "g.1")
        .unwrap()
        .tag("j_in", "l.0")
        .unwrap()
}

/// A global temporary written by one group and read back mirrored by another.
pub fn global_exchange() -> Kernel {
    let mirrored = var("n") - 1 - var("i");
    Kernel::builder()
        .name("exchange")
        .domain("[n] -> { [i] : 0 <= i < n }")
        .assumptions("n >= 1")
        .arrays(vec![
            ArrayDecl::global("a", DType::Float32, ["n"]),
            ArrayDecl::global("b", DType::Float32, ["n"]),
            ArrayDecl::global("tmp", DType::Float32, ["n"]).temporary(),
        ])
        .instructions(vec![
            Instruction::new("publish", at("tmp", [var("i")]), at("a", [var("i")]) * 2),
            Instruction::new("mirror", at("b", [var("i")]), at("tmp", [mirrored])).depends_on(["publish"]),
        ])
        .build()
        .unwrap()
        .tag("i", "g.0")
        .unwrap()
}

fn copy_kernel(arrays: Vec<ArrayDecl>, lhs: Expr, rhs: Expr) -> Kernel {
    Kernel::builder()
        .name("strided")
        .domain("[n] -> { [i] : 0 <= i < n }")
        .assumptions("n >= 1")
        .arrays(arrays)
        .instructions(vec![Instruction::new("copy", lhs, rhs)])
        .build()
        .unwrap()
}

/// `b[i] = a[i] + a[i + 1] + ... + a[i + taps - 1]`
pub fn stencil(taps: i64) -> Kernel {
    let halo = &QPoly::param("n") + &QPoly::from(taps - 1);
    let sum = (1..taps).fold(at("a", [var("i")]), |acc, k| acc + at("a", [var("i") + k]));
    copy_kernel(
        vec![ArrayDecl::global("a", DType::Float32, [halo]), ArrayDecl::global("b", DType::Float32, ["n"])],
        at("b", [var("i")]),
        sum,
    )
}

/// `c[2 * i] = a[i]`
pub fn spread_store() -> Kernel {
    let wide = &QPoly::from(2) * &QPoly::param("n");
    copy_kernel(
        vec![ArrayDecl::global("a", DType::Float32, ["n"]), ArrayDecl::global("c", DType::Float32, [wide])],
        at("c", [var("i") * 2]),
        at("a", [var("i")]),
    )
}

/// `z[i] = x[3 * i]`
pub fn strided_load() -> Kernel {
    let wide = &QPoly::from(3) * &QPoly::param("n");
    copy_kernel(
        vec![ArrayDecl::global("x", DType::Float32, [wide]), ArrayDecl::global("z", DType::Float32, ["n"])],
        at("z", [var("i")]),
        at("x", [var("i") * 3]),
    )
}
