use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tr_parser::{parse_to_ir, tokenize};

const SIMPLE: &str = r#"
def add(a: Integer, b: Integer): Integer
  a + b
end
"#;

const CLASS: &str = r#"
type UserId = Integer
type Email = String?

interface Named
  name: String
end

class User < Base
  @id: UserId
  @email: Email

  def initialize({ id: UserId, name: String = "anon" }: Named)
    @id = id
    @name = name
  end

  def self.find(id: UserId): User?
    nil
  end

  def tags(*labels: String, **options: Integer, &block: Proc): Array<String>
    labels.map { |label| label.upcase }
  end

  private

  def secret: Hash<Symbol, String>
    { token: "x" }
  end
end
"#;

fn generated(methods: usize) -> String {
    (0..methods)
        .map(|i| format!("def method_{i}(x: Integer, y: Integer = {i}): Integer\n  x + y * {i}\nend\n\n"))
        .collect()
}

fn benchmark_parse_simple(c: &mut Criterion) {
    c.bench_function("parse_simple", |b| b.iter(|| parse_to_ir(black_box(SIMPLE))));
}

fn benchmark_parse_class(c: &mut Criterion) {
    c.bench_function("tokenize_class", |b| b.iter(|| tokenize(black_box(CLASS))));
    c.bench_function("parse_class", |b| b.iter(|| parse_to_ir(black_box(CLASS))));
}

fn benchmark_parse_large(c: &mut Criterion) {
    let source = generated(500);
    c.bench_function("parse_500_methods", |b| b.iter(|| parse_to_ir(black_box(&source))));
}

criterion_group!(benches, benchmark_parse_simple, benchmark_parse_class, benchmark_parse_large);
criterion_main!(benches);
