use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tr_checker::{check, check_with_registry, TypeAliasRegistry};
use tr_parser::parse_to_ir;

fn benchmark_type_check_simple(c: &mut Criterion) {
    let source = r#"
def add(a: Integer, b: Integer): Integer
  a + b
end

def bad(): Integer
  "x"
end
"#;

    c.bench_function("type_check_simple", |b| {
        let (program, _) = parse_to_ir(source);

        b.iter(|| check_with_registry(black_box(&program), "bench.trb"))
    });

    c.bench_function("check_source_simple", |b| b.iter(|| check(black_box(source))));
}

fn benchmark_alias_registry(c: &mut Criterion) {
    // a long alias chain closed into one cycle
    let mut source: String = (0..200).map(|i| format!("type A{i} = A{}|Integer\n", i + 1)).collect();
    source.push_str("type A200 = A0\n");

    c.bench_function("alias_registry_cycle", |b| {
        let (program, _) = parse_to_ir(&source);

        b.iter(|| TypeAliasRegistry::from_program(black_box(&program)))
    });
}

fn benchmark_type_check_class(c: &mut Criterion) {
    let methods: String = (0..100)
        .map(|i| format!("  def m{i}(x: Integer): Integer\n    x * {i} + helper\n  end\n\n"))
        .collect();
    let source = format!("class Calc\n  @total: Integer\n\n  def helper: Integer\n    @total\n  end\n\n{methods}end\n");

    c.bench_function("type_check_class", |b| {
        let (program, _) = parse_to_ir(&source);

        b.iter(|| check_with_registry(black_box(&program), "calc.trb"))
    });
}

criterion_group!(benches, benchmark_type_check_simple, benchmark_alias_registry, benchmark_type_check_class);
criterion_main!(benches);
