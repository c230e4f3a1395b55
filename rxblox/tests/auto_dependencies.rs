//! Dynamic dependency rewiring: a computed signal that reads a different
//! source each time depending on another signal's value should only react
//! to changes in whichever source it actually read last, grounded on
//! `flourish/tests/auto_dependencies.rs`.

use rxblox::{Computed, Mutable};

mod _validator;
use _validator::Validator;

#[test]
fn auto_dependencies() {
    let v = &Validator::new();

    let a = Mutable::new("a");
    let b = Mutable::new("b");
    let index = Mutable::new(0);

    let signal = {
        let a = a.clone();
        let b = b.clone();
        let index = index.clone();
        Computed::new(move || {
            let value = match index.get() {
                1 => a.get(),
                2 => b.get(),
                _ => "",
            };
            v.push(value);
            value
        })
    };
    v.expect([]); // lazy: no read yet, so no push

    let subscription = signal.on(|| {});
    signal.get(); // first read: index==0, reads neither a nor b
    v.expect([""]);

    a.set("aa");
    b.set("bb");
    v.expect([]); // signal depends on neither yet, so no recompute needed

    index.set(1);
    signal.get();
    v.expect(["aa"]);

    a.set("aaa");
    signal.get();
    v.expect(["aaa"]);

    b.set("bbb"); // signal doesn't depend on `b` yet — index still selects `a`
    signal.get();
    v.expect([]);

    index.set(2);
    signal.get();
    v.expect(["bbb"]);

    a.set("a"); // signal no longer depends on `a`
    signal.get();
    v.expect([]);

    subscription.unsubscribe();
}
