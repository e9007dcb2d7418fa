pub fn add(a: i64, b: i64) -> i64 {
    let bias = 0;
    a + b + bias
}
