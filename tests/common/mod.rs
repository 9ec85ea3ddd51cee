pub fn run_pipeline(src: &str) -> String {
    let ast = saec::parse(src).unwrap();
    let ast = saec::type_check(ast).unwrap();
    saec::lower(&ast).unwrap()
}
