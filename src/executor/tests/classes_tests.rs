use super::helpers::{run_err, run_ok};

#[test]
fn test_init_and_methods() {
    let source = "\
class Counter:
    step = 1

    def __init__(self, start):
        self.value = start

    def bump(self):
        self.value += self.step
        return self

c = Counter(10)
c.bump().bump()
print(c.value, Counter.step)
";
    assert_eq!(run_ok(source), "12 1\n");
}

#[test]
fn test_default_instance_repr() {
    let out = run_ok("class Point:\n    pass\nprint(repr(Point())[:18])\nprint(Point)");
    assert_eq!(out, "<__main__.Point ob\n<class '__main__.Point'>\n");
}

#[test]
fn test_inheritance_and_super() {
    let source = "\
class Animal:
    def __init__(self, name):
        self.name = name
    def speak(self):
        return self.name + ' makes a sound'

class Dog(Animal):
    def __init__(self, name):
        super().__init__(name.title())
    def speak(self):
        return super().speak() + ' (woof)'

d = Dog('rex')
print(d.speak())
print(isinstance(d, Animal), issubclass(Dog, object), type(d).__name__)
";
    assert_eq!(run_ok(source), "Rex makes a sound (woof)\nTrue True Dog\n");
}

#[test]
fn test_method_resolution_order_is_c3() {
    let source = "\
class A:
    def who(self):
        return 'A'
class B(A):
    pass
class C(A):
    def who(self):
        return 'C'
class D(B, C):
    pass
print(D().who(), [k.__name__ for k in D.__mro__])
";
    assert_eq!(run_ok(source), "C ['D', 'B', 'C', 'A', 'object']\n");
}

#[test]
fn test_dunder_operators() {
    let source = "\
class Vec:
    def __init__(self, x, y):
        self.x = x
        self.y = y
    def __add__(self, other):
        return Vec(self.x + other.x, self.y + other.y)
    def __eq__(self, other):
        return self.x == other.x and self.y == other.y
    def __repr__(self):
        return f'Vec({self.x}, {self.y})'
    def __len__(self):
        return 2

v = Vec(1, 2) + Vec(3, 4)
print(v, v == Vec(4, 6), len(v), [v])
";
    assert_eq!(run_ok(source), "Vec(4, 6) True 2 [Vec(4, 6)]\n");
}

#[test]
fn test_rich_comparison_drives_sorting() {
    let source = "\
class Item:
    def __init__(self, rank):
        self.rank = rank
    def __lt__(self, other):
        return self.rank < other.rank
items = sorted([Item(3), Item(1), Item(2)])
print([i.rank for i in items])
";
    assert_eq!(run_ok(source), "[1, 2, 3]\n");
}

#[test]
fn test_property_classmethod_staticmethod() {
    let source = "\
class Temp:
    scale = 'C'
    def __init__(self, c):
        self._c = c
    @property
    def fahrenheit(self):
        return self._c * 9 / 5 + 32
    @classmethod
    def freezing(cls):
        return cls(0)
    @staticmethod
    def describe():
        return 'temperature'

t = Temp.freezing()
print(t.fahrenheit, Temp.describe(), t.describe())
";
    assert_eq!(run_ok(source), "32.0 temperature temperature\n");
}

#[test]
fn test_container_protocol() {
    let source = "\
class Squares:
    def __init__(self, n):
        self.n = n
    def __getitem__(self, i):
        if i >= self.n:
            raise IndexError(i)
        return i * i
    def __contains__(self, value):
        return value in [i * i for i in range(self.n)]

s = Squares(4)
print(s[3], 9 in s, 5 in s)
";
    assert_eq!(run_ok(source), "9 True False\n");
}

#[test]
fn test_iterator_protocol() {
    let source = "\
class Countdown:
    def __init__(self, start):
        self.current = start
    def __iter__(self):
        return self
    def __next__(self):
        if self.current <= 0:
            raise StopIteration
        self.current -= 1
        return self.current + 1

print(list(Countdown(3)))
";
    assert_eq!(run_ok(source), "[3, 2, 1]\n");
}

#[test]
fn test_callable_instance() {
    let source = "\
class Adder:
    def __init__(self, n):
        self.n = n
    def __call__(self, x):
        return x + self.n
print(Adder(5)(10), callable(Adder(1)))
";
    assert_eq!(run_ok(source), "15 True\n");
}

#[test]
fn test_missing_attribute() {
    let source = "class Empty:\n    pass\nEmpty().missing";
    let (error_type, message) = run_err(source);
    assert_eq!(error_type, "AttributeError");
    assert_eq!(message, "'Empty' object has no attribute 'missing'");
}

#[test]
fn test_unhashable_when_eq_defined() {
    let source = "\
class Key:
    def __eq__(self, other):
        return True
s = {Key()}
";
    let (error_type, message) = run_err(source);
    assert_eq!(error_type, "TypeError");
    assert_eq!(message, "unhashable type: 'Key'");
}
