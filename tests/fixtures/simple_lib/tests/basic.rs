use simple_lib::add;

#[test]
fn adds_small_numbers() {
    assert_eq!(add(1, 2), 3);
}
