// End-to-end evaluation through the full pipeline:
// read → macro-expand → compile → execute.

mod common;

use common::Interp;
use sable::Value;

fn num(n: f64) -> Value {
    Value::number(n)
}

#[test]
fn test_addition() {
    let mut interp = Interp::new();
    assert_eq!(interp.eval_ok("(+ 1 2)"), num(3.0));
}

#[test]
fn test_factorial() {
    let mut interp = Interp::new();
    interp.eval_ok("(define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))");
    assert_eq!(interp.eval_ok("(fact 10)"), num(3628800.0));
}

#[test]
fn test_deep_tail_recursion() {
    let mut interp = Interp::new();
    interp.eval_ok("(define (loop n) (if (= n 0) 'done (loop (- n 1))))");
    assert_eq!(interp.eval_to_string("(loop 1000000)"), "done");
}

#[test]
fn test_mutual_tail_recursion() {
    let mut interp = Interp::new();
    interp.eval_ok("(define (even2? n) (if (= n 0) #t (odd2? (- n 1))))");
    interp.eval_ok("(define (odd2? n) (if (= n 0) #f (even2? (- n 1))))");
    assert_eq!(interp.eval_ok("(even2? 100000)"), Value::TRUE);
}

#[test]
fn test_let() {
    let mut interp = Interp::new();
    assert_eq!(interp.eval_ok("(let ((x 1) (y 2)) (+ x y))"), num(3.0));
}

#[test]
fn test_named_let() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.eval_ok("(let sum ((n 10) (acc 0)) (if (= n 0) acc (sum (- n 1) (+ acc n))))"),
        num(55.0)
    );
}

#[test]
fn test_letrec() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.eval_ok(
            "(letrec ((even? (lambda (n) (if (= n 0) #t (odd? (- n 1)))))
                      (odd? (lambda (n) (if (= n 0) #f (even? (- n 1))))))
               (even? 10))"
        ),
        Value::TRUE
    );
}

#[test]
fn test_define_macro_when() {
    let mut interp = Interp::new();
    interp.eval_ok(
        "(define-macro (when args) (list 'if (car args) (cons 'begin (cdr args))))",
    );
    assert_eq!(interp.eval_ok("(when (= 1 1) 42)"), num(42.0));
    assert_eq!(interp.eval_ok("(when (= 1 2) 42)"), Value::Null);
}

#[test]
fn test_quasiquote() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.eval_to_string("`(a ,(+ 1 2) ,@(list 3 4) 5)"),
        "(a 3 3 4 5)"
    );
}

#[test]
fn test_apply() {
    let mut interp = Interp::new();
    assert_eq!(interp.eval_ok("(apply + '(1 2 3 4))"), num(10.0));
    assert_eq!(interp.eval_ok("(apply + 1 2 '(3 4))"), num(10.0));
}

#[test]
fn test_apply_in_tail_position() {
    let mut interp = Interp::new();
    interp.eval_ok("(define (f args) (apply + args))");
    assert_eq!(interp.eval_ok("(f '(1 2 3))"), num(6.0));
}

#[test]
fn test_vectors() {
    let mut interp = Interp::new();
    interp.eval_ok("(define v (vector 1 2 3))");
    assert_eq!(interp.eval_ok("(vector-ref v 1)"), num(2.0));
    interp.eval_ok("(vector-set! v 1 99)");
    assert_eq!(interp.eval_ok("(vector-ref v 1)"), num(99.0));
    assert_eq!(interp.eval_ok("(vector-length v)"), num(3.0));
}

#[test]
fn test_vector_literal_evaluates_elements() {
    let mut interp = Interp::new();
    assert_eq!(interp.eval_to_string("[(+ 1 2) 4]"), "[3 4]");
}

#[test]
fn test_optional_parameters() {
    let mut interp = Interp::new();
    interp.eval_ok("(define (f a [b 10] [c 20]) (+ a b c))");
    assert_eq!(interp.eval_ok("(f 1)"), num(31.0));
    assert_eq!(interp.eval_ok("(f 1 2)"), num(23.0));
    assert_eq!(interp.eval_ok("(f 1 2 3)"), num(6.0));
    assert!(interp.eval("(f 1 2 3 4)").is_err());
}

#[test]
fn test_keyword_parameters() {
    let mut interp = Interp::new();
    interp.eval_ok("(define (f a {x: 0 y: 0}) (+ a x y))");
    assert_eq!(interp.eval_ok("(f 1 y: 5)"), num(6.0));
    assert_eq!(interp.eval_ok("(f 1 x: 2 y: 5)"), num(8.0));
    assert_eq!(interp.eval_ok("(f 1)"), num(1.0));
    // duplicates overwrite
    assert_eq!(interp.eval_ok("(f 1 y: 5 y: 7)"), num(8.0));
    // odd trailing count is an error
    assert!(interp.eval("(f 1 y:)").is_err());
    // unknown keys are errors
    assert!(interp.eval("(f 1 z: 3)").is_err());
}

#[test]
fn test_rest_parameters() {
    let mut interp = Interp::new();
    interp.eval_ok("(define (f a . rest) (cons a rest))");
    assert_eq!(interp.eval_to_string("(f 1 2 3)"), "(1 2 3)");
    assert_eq!(interp.eval_to_string("(f 1)"), "(1)");
    interp.eval_ok("(define (g . all) all)");
    assert_eq!(interp.eval_to_string("(g 1 2)"), "(1 2)");
}

#[test]
fn test_exact_arity_is_enforced() {
    let mut interp = Interp::new();
    interp.eval_ok("(define (f a) a)");
    assert!(interp.eval("(f)").is_err());
    assert!(interp.eval("(f 1 2)").is_err());
}

#[test]
fn test_set_of_bound_global() {
    let mut interp = Interp::new();
    interp.eval_ok("(define x 1)");
    interp.eval_ok("(set! x 2)");
    assert_eq!(interp.eval_ok("x"), num(2.0));
}

#[test]
fn test_set_of_unbound_global_errors() {
    let mut interp = Interp::new();
    let err = interp.eval("(set! nowhere 1)").unwrap_err();
    assert!(err.to_string().contains("Undefined symbol"));
}

#[test]
fn test_set_of_local() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.eval_ok("((lambda (x) (set! x 5) x) 1)"),
        num(5.0)
    );
}

#[test]
fn test_undefine() {
    let mut interp = Interp::new();
    interp.eval_ok("(define x 1)");
    assert_eq!(interp.eval_to_string("(undefine x)"), "x");
    assert!(interp.eval("x").is_err());
}

#[test]
fn test_closures_share_their_frame() {
    let mut interp = Interp::new();
    interp.eval_ok(
        "(define (counter) ((lambda (n) (list (lambda () (set! n (+ n 1)) n)
                                              (lambda () n))) 0))",
    );
    interp.eval_ok("(define pair (counter))");
    interp.eval_ok("((car pair))");
    interp.eval_ok("((car pair))");
    assert_eq!(interp.eval_ok("((cadr pair))"), num(2.0));
}

#[test]
fn test_cond() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.eval_ok("(cond ((= 1 2) 'a) ((= 1 1) 'b) (else 'c))"),
        interp.eval_ok("'b")
    );
    assert_eq!(
        interp.eval_ok("(cond ((= 1 2) 'a) (else 'c))"),
        interp.eval_ok("'c")
    );
    // no matching clause yields null
    assert_eq!(interp.eval_ok("(cond ((= 1 2) 'a))"), Value::Null);
}

#[test]
fn test_cond_arrow() {
    let mut interp = Interp::new();
    interp.eval_ok("(define (add1 n) (+ n 1))");
    assert_eq!(
        interp.eval_ok("(cond ((+ 1 2) => add1) (else 'no))"),
        num(4.0)
    );
}

#[test]
fn test_do_loop() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.eval_ok("(do ((i 0 (+ i 1)) (acc 0 (+ acc i))) ((= i 5) acc))"),
        num(10.0)
    );
}

#[test]
fn test_internal_defines_become_letrec() {
    let mut interp = Interp::new();
    interp.eval_ok(
        "(define (f n)
           (define (double x) (* 2 x))
           (define (inc x) (+ 1 x))
           (double (inc n)))",
    );
    assert_eq!(interp.eval_ok("(f 4)"), num(10.0));
}

#[test]
fn test_keyword_as_getter() {
    let mut interp = Interp::new();
    interp.eval_ok("(define s (struct 'x 5 'y 6))");
    assert_eq!(interp.eval_ok("(x: s)"), num(5.0));
    assert_eq!(interp.eval_ok("(get s 'y)"), num(6.0));
    // missing keys read as null
    assert_eq!(interp.eval_ok("(get s 'z)"), Value::Null);
    // keyword calls take exactly one argument
    assert!(interp.eval("(x: s s)").is_err());
}

#[test]
fn test_struct_literal() {
    let mut interp = Interp::new();
    interp.eval_ok("(define s {x: (+ 1 2) y: 4})");
    assert_eq!(interp.eval_ok("(get s 'x)"), num(3.0));
    assert_eq!(interp.eval_ok("(y: s)"), num(4.0));
}

#[test]
fn test_call_cc_is_stubbed() {
    let mut interp = Interp::new();
    let err = interp.eval("(call/cc (lambda (k) (k 1)))").unwrap_err();
    assert!(err.to_string().contains("call/cc"));
}

#[test]
fn test_not_a_function() {
    let mut interp = Interp::new();
    let err = interp.eval("(1 2 3)").unwrap_err();
    assert!(err.to_string().contains("Not a function"));
}

#[test]
fn test_error_carries_function_context() {
    let mut interp = Interp::new();
    interp.eval_ok("(define (boom) (car 5))");
    let err = interp.eval("(boom)").unwrap_err();
    assert!(err.to_string().contains("[in boom]"), "got: {}", err);
}

#[test]
fn test_error_primitive() {
    let mut interp = Interp::new();
    let err = interp.eval("(error \"it broke: \" 42)").unwrap_err();
    assert!(err.to_string().contains("it broke"));
}

#[test]
fn test_begin_threads_last_value() {
    let mut interp = Interp::new();
    assert_eq!(interp.eval_ok("(begin 1 2 3)"), num(3.0));
}

#[test]
fn test_if_without_alternate_yields_null() {
    let mut interp = Interp::new();
    assert_eq!(interp.eval_ok("(if #f 1)"), Value::Null);
}

#[test]
fn test_only_false_is_false() {
    let mut interp = Interp::new();
    assert_eq!(interp.eval_ok("(if 0 'yes 'no)"), interp.eval_ok("'yes"));
    assert_eq!(interp.eval_ok("(if () 'yes 'no)"), interp.eval_ok("'yes"));
    assert_eq!(interp.eval_ok("(if null 'yes 'no)"), interp.eval_ok("'yes"));
    assert_eq!(interp.eval_ok("(if #f 'yes 'no)"), interp.eval_ok("'no"));
}

#[test]
fn test_use_loads_a_module() {
    let mut interp = Interp::new();
    let dir = std::env::temp_dir().join("sable-module-tests");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("geometry.sbl"), "(define tau 6.25)\n").unwrap();
    interp.vm.add_module_search_path(dir);
    assert_eq!(interp.eval_to_string("(use geometry)"), "geometry");
    assert_eq!(interp.eval_ok("tau"), num(6.25));
    // loading is idempotent per VM
    assert_eq!(interp.eval_to_string("(use geometry)"), "geometry");
}

#[test]
fn test_use_of_missing_module_is_io_error() {
    let mut interp = Interp::new();
    let err = interp.eval("(use no-such-module)").unwrap_err();
    assert!(err.to_string().starts_with("io-error:"), "got: {}", err);
}

#[test]
fn test_interrupt_flag_aborts_evaluation() {
    use std::sync::atomic::Ordering;
    let mut interp = Interp::new();
    interp.eval_ok("(define (spin n) (if (= n 0) 'done (spin (- n 1))))");
    interp
        .vm
        .interrupt_flag()
        .store(true, Ordering::Relaxed);
    let err = interp.eval("(spin 1000000)").unwrap_err();
    assert!(err.is_interrupt());
    // the flag clears, so the next evaluation runs normally
    assert_eq!(interp.eval_ok("(+ 1 1)"), num(2.0));
}
